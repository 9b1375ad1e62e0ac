//! Collector and rewriter behaviour over whole class sets.
//!
//! Test coverage areas:
//! - Rule collection (idempotence, name-only collapse, configuration errors)
//! - Call-site rewriting (exact match, wildcard owner, wrapper self-exclusion)
//! - The two-pass pipeline over a directory, including reports

use privacy_hook_classfile::builder::{ClassBuilder, CodeBuilder, MethodSpec};
use privacy_hook_classfile::{Annotation, ClassFile, ElementValue, InvocationKind, InvokeSite};
use privacy_hook_transform::config::DEFAULT_MARKER_DESCRIPTOR;
use privacy_hook_transform::{
    ClassDisposition, ClassEntry, ClassSet, Collector, PassReport, Pipeline, RedirectionRegistry,
    RuleIdentity, RuleSet, Rewriter, TransformConfig, TransformError,
};
use uuid::Uuid;

const PRIVACY_MANAGER: &str = "com/privacyhook/PrivacyManager";
const LOCATION_MANAGER: &str = "android/location/LocationManager";
const LAST_KNOWN: &str = "(Ljava/lang/String;)Landroid/location/Location;";
const LAST_KNOWN_WRAPPER: &str =
    "(Landroid/location/LocationManager;Ljava/lang/String;)Landroid/location/Location;";

// =============================================================================
// Fixtures
// =============================================================================

fn marker(owner: &str, access: i32) -> Annotation {
    Annotation::new(DEFAULT_MARKER_DESCRIPTOR)
        .with_element("oriClass", ElementValue::Class(format!("L{};", owner)))
        .with_element("oriAccess", ElementValue::Int { tag: 'I', value: access })
}

fn entry(class_name: &str, bytes: Vec<u8>) -> ClassEntry {
    ClassEntry::new(format!("{}.class", class_name), bytes)
}

/// The wrapper class: one marked wrapper whose body calls the real accessor.
fn privacy_manager() -> ClassEntry {
    let bytes = ClassBuilder::new(PRIVACY_MANAGER)
        .method(
            MethodSpec::new("getLastKnownLocation", LAST_KNOWN_WRAPPER)
                .static_method()
                .annotated(marker(LOCATION_MANAGER, 182))
                .with_code(
                    CodeBuilder::new(2, 2)
                        .aload(0)
                        .aload(1)
                        .invoke(InvocationKind::Virtual, LOCATION_MANAGER, "getLastKnownLocation", LAST_KNOWN)
                        .areturn(),
                ),
        )
        .unwrap()
        .build()
        .unwrap();
    entry(PRIVACY_MANAGER, bytes)
}

/// `Foo.locate(lm, provider)` calls `lm.getLastKnownLocation(provider)` and
/// then `lm.getAllProviders()`.
fn foo() -> ClassEntry {
    let bytes = ClassBuilder::new("com/example/Foo")
        .method(
            MethodSpec::new("locate", "(Landroid/location/LocationManager;Ljava/lang/String;)V")
                .with_code(
                    CodeBuilder::new(2, 3)
                        .aload(1)
                        .aload(2)
                        .invoke(InvocationKind::Virtual, LOCATION_MANAGER, "getLastKnownLocation", LAST_KNOWN)
                        .pop()
                        .aload(1)
                        .invoke(InvocationKind::Virtual, LOCATION_MANAGER, "getAllProviders", "()Ljava/util/List;")
                        .pop()
                        .return_void(),
                ),
        )
        .unwrap()
        .build()
        .unwrap();
    entry("com/example/Foo", bytes)
}

fn plain_class() -> ClassEntry {
    let bytes = ClassBuilder::new("com/example/Plain")
        .method(
            MethodSpec::new("answer", "()I")
                .static_method()
                .with_code(CodeBuilder::new(1, 0).iconst(42).ireturn()),
        )
        .unwrap()
        .build()
        .unwrap();
    entry("com/example/Plain", bytes)
}

fn collect(config: &TransformConfig, classes: &ClassSet) -> anyhow::Result<RuleSet> {
    let registry = RedirectionRegistry::new(config.rule_identity);
    let mut report = PassReport::new("collect", "test", Uuid::new_v4());
    Collector::new(config).collect(classes, &registry, &mut report)?;
    Ok(registry.freeze())
}

fn rewrite(config: &TransformConfig, rules: &RuleSet, classes: &ClassSet) -> ClassSet {
    let mut report = PassReport::new("rewrite", "test", Uuid::new_v4());
    Rewriter::new(rules, config)
        .rewrite_all(classes, &mut report)
        .unwrap()
        .0
}

fn find<'a>(set: &'a ClassSet, relative_path: &str) -> &'a ClassEntry {
    set.entries()
        .iter()
        .find(|e| e.relative_path == relative_path)
        .unwrap()
}

fn sites(bytes: &[u8]) -> Vec<Vec<InvokeSite>> {
    let class = ClassFile::parse(bytes).unwrap();
    class
        .methods
        .iter()
        .filter_map(|m| m.code(&class.constant_pool).unwrap())
        .map(|code| class.invoke_sites(&code).unwrap())
        .collect()
}

fn code_bytes(bytes: &[u8]) -> Vec<u8> {
    let class = ClassFile::parse(bytes).unwrap();
    class.methods[0]
        .code(&class.constant_pool)
        .unwrap()
        .unwrap()
        .code
}

// =============================================================================
// Collector
// =============================================================================

mod collector_tests {
    use super::*;

    fn wrapper_named_get_x(class_name: &str, owner: &str) -> ClassEntry {
        let bytes = ClassBuilder::new(class_name)
            .method(
                MethodSpec::new("getX", &format!("(L{};)I", owner))
                    .static_method()
                    .annotated(marker(owner, 182))
                    .with_code(CodeBuilder::new(1, 1).iconst(0).ireturn()),
            )
            .unwrap()
            .build()
            .unwrap();
        entry(class_name, bytes)
    }

    #[test]
    fn test_collector_is_idempotent() {
        let config = TransformConfig::default();
        let classes = ClassSet::new(vec![privacy_manager(), foo(), plain_class()]);

        let registry = RedirectionRegistry::default();
        let mut report = PassReport::new("collect", "test", Uuid::new_v4());
        let collector = Collector::new(&config);
        collector.collect(&classes, &registry, &mut report).unwrap();
        let once = registry.len();
        collector.collect(&classes, &registry, &mut report).unwrap();

        assert_eq!(once, 1);
        assert_eq!(registry.len(), once);
    }

    /// Two wrappers named `getX` for different owners collapse into the
    /// first one under the default identity. This is the modeled behaviour.
    #[test]
    fn test_same_name_wrappers_collapse_to_one_rule() {
        let classes = ClassSet::new(vec![
            wrapper_named_get_x("com/a/WrapA", "com/a/Alpha"),
            wrapper_named_get_x("com/b/WrapB", "com/b/Beta"),
        ]);

        let rules = collect(&TransformConfig::default(), &classes).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.rules()[0].original_owner, "com/a/Alpha");
        assert!(rules.is_wrapper_class("com/a/WrapA"));
        assert!(rules.is_wrapper_class("com/b/WrapB"), "collapsed wrappers are still excluded");

        let strict = TransformConfig::default().with_rule_identity(RuleIdentity::Qualified);
        assert_eq!(collect(&strict, &classes).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_owner_aborts_collection() {
        let broken = ClassBuilder::new("com/example/BadWrappers")
            .method(
                MethodSpec::new("getImei", "()Ljava/lang/String;")
                    .static_method()
                    .annotated(Annotation::new(DEFAULT_MARKER_DESCRIPTOR)),
            )
            .unwrap()
            .build()
            .unwrap();
        let classes = ClassSet::new(vec![privacy_manager(), entry("com/example/BadWrappers", broken)]);

        let err = collect(&TransformConfig::default(), &classes).unwrap_err();
        let typed = err.downcast_ref::<TransformError>().unwrap();
        assert!(typed.is_configuration());
        assert!(err
            .to_string()
            .contains("com/example/BadWrappers#getImei()Ljava/lang/String;"));
    }

    #[test]
    fn test_visible_marker_is_collected() {
        let bytes = ClassBuilder::new("com/example/VisibleWrappers")
            .method(
                MethodSpec::new("getMeid", "(Landroid/telephony/TelephonyManager;)Ljava/lang/String;")
                    .static_method()
                    .annotated_visible(marker("android/telephony/TelephonyManager", 182)),
            )
            .unwrap()
            .build()
            .unwrap();
        let rules = collect(
            &TransformConfig::default(),
            &ClassSet::new(vec![entry("com/example/VisibleWrappers", bytes)]),
        )
        .unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.rules()[0].original_descriptor, "()Ljava/lang/String;");
    }
}

// =============================================================================
// Rewriter
// =============================================================================

mod rewriter_tests {
    use super::*;

    #[test]
    fn test_matching_site_takes_target_fields() {
        let config = TransformConfig::default();
        let classes = ClassSet::new(vec![privacy_manager(), foo()]);
        let rules = collect(&config, &classes).unwrap();
        let output = rewrite(&config, &rules, &classes);

        let before = find(&classes, "com/example/Foo.class");
        let after = find(&output, "com/example/Foo.class");
        let rewritten = &sites(&after.bytes)[0];

        assert_eq!(rewritten[0].offset, 2);
        assert_eq!(rewritten[0].kind, InvocationKind::Static);
        assert_eq!(rewritten[0].owner, PRIVACY_MANAGER);
        assert_eq!(rewritten[0].name, "getLastKnownLocation");
        assert_eq!(rewritten[0].descriptor, LAST_KNOWN_WRAPPER);

        // The unrelated call is still the original.
        assert_eq!(rewritten[1].owner, LOCATION_MANAGER);
        assert_eq!(rewritten[1].name, "getAllProviders");
        assert_eq!(rewritten[1].kind, InvocationKind::Virtual);

        let old_code = code_bytes(&before.bytes);
        let new_code = code_bytes(&after.bytes);
        assert_eq!(old_code.len(), new_code.len());
        for (i, (a, b)) in old_code.iter().zip(new_code.iter()).enumerate() {
            if !(2..5).contains(&i) {
                assert_eq!(a, b, "byte {} outside the patched call changed", i);
            }
        }
    }

    #[test]
    fn test_wrapper_on_interface_uses_interface_ref() {
        let hooks = "com/example/PrivacyHooks";
        let bytes = ClassBuilder::new(hooks)
            .interface()
            .method(
                MethodSpec::new("getLastKnownLocation", LAST_KNOWN_WRAPPER)
                    .static_method()
                    .annotated(marker(LOCATION_MANAGER, 182))
                    .with_code(
                        CodeBuilder::new(2, 2)
                            .aload(0)
                            .aload(1)
                            .invoke(InvocationKind::Virtual, LOCATION_MANAGER, "getLastKnownLocation", LAST_KNOWN)
                            .areturn(),
                    ),
            )
            .unwrap()
            .build()
            .unwrap();

        let config = TransformConfig::default();
        let classes = ClassSet::new(vec![entry(hooks, bytes), foo()]);
        let rules = collect(&config, &classes).unwrap();
        assert!(rules.rules()[0].target_interface);

        let output = rewrite(&config, &rules, &classes);
        let rewritten = &sites(&find(&output, "com/example/Foo.class").bytes)[0][0];
        assert_eq!(rewritten.kind, InvocationKind::Static);
        assert_eq!(rewritten.owner, hooks);
        assert!(rewritten.interface_ref);

        // A wrapper on a plain class keeps a Methodref.
        let classes = ClassSet::new(vec![privacy_manager(), foo()]);
        let rules = collect(&config, &classes).unwrap();
        let output = rewrite(&config, &rules, &classes);
        assert!(!sites(&find(&output, "com/example/Foo.class").bytes)[0][0].interface_ref);
    }

    #[test]
    fn test_owner_mismatch_left_untouched() {
        let config = TransformConfig::default();
        let rules = collect(&config, &ClassSet::new(vec![privacy_manager()])).unwrap();

        let bytes = ClassBuilder::new("com/example/Custom")
            .method(
                MethodSpec::new("run", "(Lcom/example/MyLocations;Ljava/lang/String;)V").with_code(
                    CodeBuilder::new(2, 3)
                        .aload(1)
                        .aload(2)
                        .invoke(InvocationKind::Virtual, "com/example/MyLocations", "getLastKnownLocation", LAST_KNOWN)
                        .pop()
                        .return_void(),
                ),
            )
            .unwrap()
            .build()
            .unwrap();
        let classes = ClassSet::new(vec![entry("com/example/Custom", bytes.clone())]);
        let output = rewrite(&config, &rules, &classes);
        assert_eq!(output.entries()[0].bytes, bytes, "no match means byte-identical output");
    }

    #[test]
    fn test_wildcard_owner_matches_any_owner() {
        let wrapper = ClassBuilder::new("com/example/Wifi")
            .method(
                MethodSpec::new("getSSID", "(Ljava/lang/Object;)Ljava/lang/String;")
                    .static_method()
                    .annotated(marker("java/lang/Object", 185)),
            )
            .unwrap()
            .build()
            .unwrap();
        let caller = ClassBuilder::new("com/example/Caller")
            .method(
                MethodSpec::new("both", "(Lcom/a/Radio;Lcom/b/Modem;)V").with_code(
                    CodeBuilder::new(1, 3)
                        .aload(1)
                        .invoke(InvocationKind::Interface, "com/a/Radio", "getSSID", "()Ljava/lang/String;")
                        .pop()
                        .aload(2)
                        .invoke(InvocationKind::Interface, "com/b/Modem", "getSSID", "()Ljava/lang/String;")
                        .pop()
                        .aload(2)
                        .invoke(InvocationKind::Virtual, "com/b/Modem", "getSSID", "()Ljava/lang/String;")
                        .pop()
                        .return_void(),
                ),
            )
            .unwrap()
            .build()
            .unwrap();

        let config = TransformConfig::default();
        let classes = ClassSet::new(vec![
            entry("com/example/Wifi", wrapper),
            entry("com/example/Caller", caller),
        ]);
        let rules = collect(&config, &classes).unwrap();
        let output = rewrite(&config, &rules, &classes);

        let rewritten = &sites(&find(&output, "com/example/Caller.class").bytes)[0];
        assert_eq!(rewritten.len(), 3);
        for site in &rewritten[..2] {
            assert_eq!(site.owner, "com/example/Wifi");
            assert_eq!(site.kind, InvocationKind::Static);
            assert_eq!(site.descriptor, "(Ljava/lang/Object;)Ljava/lang/String;");
        }
        assert_eq!(rewritten[2].owner, "com/b/Modem", "kind must still match exactly");
    }

    #[test]
    fn test_invokedynamic_site_matches_wildcard_rule() {
        let wrapper = ClassBuilder::new("com/example/Lambdas")
            .method(
                MethodSpec::new("run", "()Ljava/lang/Runnable;")
                    .static_method()
                    .annotated(marker("java/lang/Object", 186)),
            )
            .unwrap()
            .build()
            .unwrap();
        let caller = ClassBuilder::new("com/example/UsesLambda")
            .method(
                MethodSpec::new("make", "()Ljava/lang/Runnable;")
                    .static_method()
                    .with_code(
                        CodeBuilder::new(1, 0)
                            .invoke_dynamic("run", "()Ljava/lang/Runnable;")
                            .areturn(),
                    ),
            )
            .unwrap()
            .build()
            .unwrap();

        let config = TransformConfig::default();
        let classes = ClassSet::new(vec![
            entry("com/example/Lambdas", wrapper),
            entry("com/example/UsesLambda", caller),
        ]);
        let rules = collect(&config, &classes).unwrap();
        let output = rewrite(&config, &rules, &classes);

        let after = &find(&output, "com/example/UsesLambda.class").bytes;
        let site = &sites(after)[0][0];
        assert_eq!(site.kind, InvocationKind::Static);
        assert_eq!(site.owner, "com/example/Lambdas");
        assert_eq!(&code_bytes(after)[3..5], &[0x00, 0x00]);
    }

    #[test]
    fn test_wrapper_class_is_never_rewritten() {
        let config = TransformConfig::default();
        let classes = ClassSet::new(vec![privacy_manager(), foo()]);
        let rules = collect(&config, &classes).unwrap();

        let rewriter = Rewriter::new(&rules, &config);
        let outcome = rewriter.rewrite_class(&privacy_manager()).unwrap();
        assert_eq!(outcome.disposition, ClassDisposition::WrapperClass);
        assert_eq!(outcome.bytes, privacy_manager().bytes);

        let output = rewrite(&config, &rules, &classes);
        let wrapper_sites = &sites(&find(&output, "com/privacyhook/PrivacyManager.class").bytes)[0];
        assert_eq!(wrapper_sites[0].owner, LOCATION_MANAGER, "wrapper still calls the real API");
    }

    #[test]
    fn test_rewrite_is_deterministic() {
        let config = TransformConfig::default();
        let classes = ClassSet::new(vec![privacy_manager(), foo(), plain_class()]);
        let rules = collect(&config, &classes).unwrap();

        let first = rewrite(&config, &rules, &classes);
        let second = rewrite(&config, &rules, &classes);
        assert_eq!(first.entries(), second.entries());
        assert_eq!(
            find(&first, "com/example/Plain.class").bytes,
            plain_class().bytes
        );
    }

    #[test]
    fn test_builtin_table_rewrites_without_wrapper_classes() {
        let config = TransformConfig::default();
        let registry = RedirectionRegistry::default();
        let mut report = PassReport::new("collect", "test", Uuid::new_v4());
        let table = privacy_hook_transform::RuleTable::builtin().unwrap();
        let summary = Collector::new(&config).collect_table(&table, &registry, &mut report);
        // getString and getPackageInfo each appear twice in the table.
        assert_eq!(summary.rules_added, 25);
        assert_eq!(summary.duplicates, 2);

        let rules = registry.freeze();
        let output = rewrite(&config, &rules, &ClassSet::new(vec![foo()]));
        let rewritten = &sites(&output.entries()[0].bytes)[0];
        assert_eq!(rewritten[0].owner, PRIVACY_MANAGER);
        assert_eq!(rewritten[0].descriptor, LAST_KNOWN_WRAPPER);
    }
}

// =============================================================================
// Pipeline
// =============================================================================

mod pipeline_tests {
    use super::*;

    /// Marker on `PrivacyManager.getLastKnownLocation` redirects `Foo`'s
    /// virtual call to a static call with the receiver as first argument.
    #[test]
    fn test_location_manager_end_to_end() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let reports = tempfile::tempdir().unwrap();
        ClassSet::new(vec![privacy_manager(), foo(), plain_class()])
            .write_tree(input.path())
            .unwrap();
        std::fs::write(input.path().join("app.properties"), "k=v").unwrap();

        let config = TransformConfig::default()
            .with_reports_dir(reports.path())
            .with_variant("release")
            .with_threads(Some(2));
        let summary = Pipeline::new(config).run(input.path(), output.path()).unwrap();

        assert_eq!(summary.rules, 1);
        assert_eq!(summary.rewrite.classes_rewritten, 1);
        assert_eq!(summary.rewrite.call_sites_rewritten, 1);
        assert_eq!(summary.rewrite.wrapper_classes_skipped, 1);
        assert_eq!(summary.files_written, 4);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["run_id"], summary.run_id.to_string());

        let foo_out = std::fs::read(output.path().join("com/example/Foo.class")).unwrap();
        let site = &sites(&foo_out)[0][0];
        assert_eq!(site.kind, InvocationKind::Static);
        assert_eq!(site.owner, PRIVACY_MANAGER);
        assert_eq!(site.name, "getLastKnownLocation");
        assert_eq!(site.descriptor, LAST_KNOWN_WRAPPER);

        assert_eq!(
            std::fs::read(output.path().join("app.properties")).unwrap(),
            b"k=v"
        );

        let collect_report = std::fs::read_to_string(summary.collect_report.unwrap()).unwrap();
        assert!(collect_report.contains("add rule: opcode=182,owner=android/location/LocationManager"));
        let rewrite_report = std::fs::read_to_string(
            reports.path().join("rewrite/release/report.txt"),
        )
        .unwrap();
        assert!(rewrite_report.contains("rewrite com/example/Foo#locate"));
        assert!(rewrite_report.contains("skip wrapper class: com/privacyhook/PrivacyManager.class"));
    }

    #[test]
    fn test_malformed_input_fails_run() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join("Broken.class"), [0xca, 0xfe]).unwrap();

        let err = Pipeline::new(TransformConfig::default())
            .run(input.path(), output.path())
            .unwrap_err();
        assert!(err.to_string().starts_with("MALFORMED_CLASS Broken.class"));
        assert!(!output.path().join("Broken.class").exists());
    }
}
