//! Redirection rules and the call sites they are matched against.

use privacy_hook_classfile::{Annotation, ElementValue, FieldType, InvocationKind, MethodDescriptor};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TransformError;

/// Owner that matches any call-site owner.
pub const WILDCARD_OWNER: &str = "java/lang/Object";

/// Marker element naming the class of the replaced call.
pub const MARKER_ORIGINAL_CLASS: &str = "oriClass";
/// Marker element overriding the replaced method's name.
pub const MARKER_ORIGINAL_METHOD: &str = "oriMethod";
/// Marker element carrying the replaced call's invoke opcode.
pub const MARKER_ORIGINAL_ACCESS: &str = "oriAccess";

/// One call-site shape to replace and the wrapper call replacing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RedirectionRule {
    pub original_owner: String,
    pub original_method: String,
    pub original_descriptor: String,
    pub original_kind: InvocationKind,
    pub target_owner: String,
    pub target_method: String,
    pub target_descriptor: String,
    pub target_kind: InvocationKind,
    /// The target owner is an interface, so the call needs an
    /// `InterfaceMethodref` even when it is `invokestatic`.
    #[serde(default)]
    pub target_interface: bool,
}

/// When two rules count as duplicates of each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleIdentity {
    /// Same original method name, whatever the owner or descriptor.
    ///
    /// Two distinct call sites sharing a name collapse into the first rule.
    #[default]
    MethodName,
    /// Same original owner, method, descriptor and kind.
    Qualified,
}

impl RuleIdentity {
    pub fn same_rule(self, a: &RedirectionRule, b: &RedirectionRule) -> bool {
        match self {
            RuleIdentity::MethodName => a.original_method == b.original_method,
            RuleIdentity::Qualified => {
                a.original_method == b.original_method
                    && a.original_owner == b.original_owner
                    && a.original_descriptor == b.original_descriptor
                    && a.original_kind == b.original_kind
            }
        }
    }
}

/// A wrapper method as seen by the collector.
#[derive(Debug, Clone, Copy)]
pub struct WrapperMethod<'a> {
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub is_static: bool,
    /// The declaring class is an interface.
    pub in_interface: bool,
}

impl RedirectionRule {
    /// Derive a rule from a marker attached to `wrapper`.
    ///
    /// The wrapper is always the static target. The original descriptor is
    /// the wrapper's own, minus the explicit receiver for instance kinds.
    pub fn from_marker(
        wrapper: WrapperMethod<'_>,
        marker: &Annotation,
    ) -> Result<Self, TransformError> {
        let fail = |reason: String| {
            TransformError::configuration(
                wrapper.class_name,
                format!("{}{}", wrapper.name, wrapper.descriptor),
                reason,
            )
        };

        let original_owner = match marker.element(MARKER_ORIGINAL_CLASS) {
            Some(ElementValue::Class(descriptor)) => match FieldType::parse(descriptor) {
                Ok(FieldType::Object(name)) => name,
                _ => {
                    return Err(fail(format!(
                        "{} must name an object type, got {:?}",
                        MARKER_ORIGINAL_CLASS, descriptor
                    )))
                }
            },
            Some(other) => {
                return Err(fail(format!(
                    "{} must be a class literal, got {}",
                    MARKER_ORIGINAL_CLASS,
                    other.kind_name()
                )))
            }
            None => return Err(fail(format!("marker has no {}", MARKER_ORIGINAL_CLASS))),
        };

        let original_method = match marker.element(MARKER_ORIGINAL_METHOD) {
            Some(ElementValue::String(s)) if !s.is_empty() => s.clone(),
            Some(ElementValue::String(_)) | None => wrapper.name.to_string(),
            Some(other) => {
                return Err(fail(format!(
                    "{} must be a string, got {}",
                    MARKER_ORIGINAL_METHOD,
                    other.kind_name()
                )))
            }
        };

        let original_kind = match marker.element(MARKER_ORIGINAL_ACCESS) {
            Some(ElementValue::Int { value, .. }) => InvocationKind::from_marker_value(*value)
                .map_err(|e| fail(format!("{}: {}", MARKER_ORIGINAL_ACCESS, e)))?,
            Some(other) => {
                return Err(fail(format!(
                    "{} must be an int opcode, got {}",
                    MARKER_ORIGINAL_ACCESS,
                    other.kind_name()
                )))
            }
            None => InvocationKind::Static,
        };

        if !wrapper.is_static {
            return Err(fail("wrapper method must be static".to_string()));
        }

        let target = MethodDescriptor::parse(wrapper.descriptor)
            .map_err(|e| fail(format!("wrapper descriptor: {}", e)))?;
        let original = if original_kind.has_receiver() {
            match target.params.first() {
                Some(receiver) if receiver.is_reference() => target
                    .without_first_parameter()
                    .map_err(|e| fail(e.to_string()))?,
                _ => {
                    return Err(fail(format!(
                        "{} call needs the receiver as an explicit first reference parameter",
                        original_kind
                    )))
                }
            }
        } else {
            target.clone()
        };

        Ok(Self {
            original_owner,
            original_method,
            original_descriptor: original.to_string(),
            original_kind,
            target_owner: wrapper.class_name.to_string(),
            target_method: wrapper.name.to_string(),
            target_descriptor: wrapper.descriptor.to_string(),
            target_kind: InvocationKind::Static,
            target_interface: wrapper.in_interface,
        })
    }

    /// Whether the rewritten call must reference an `InterfaceMethodref`.
    pub fn target_is_interface_ref(&self) -> bool {
        self.target_interface || self.target_kind == InvocationKind::Interface
    }

    /// Structural match: name, descriptor and kind exactly, owner exactly or
    /// through the wildcard.
    pub fn matches(&self, site: &CallSite, wildcard_owner: &str) -> bool {
        self.original_method == site.method
            && self.original_descriptor == site.descriptor
            && self.original_kind == site.kind
            && (self.original_owner == site.owner || self.original_owner == wildcard_owner)
    }

    /// Check that replacing the original call with the target leaves the
    /// operand stack in the same shape.
    pub fn check_stack_shape(&self) -> Result<(), String> {
        let original = MethodDescriptor::parse(&self.original_descriptor)
            .map_err(|e| format!("original descriptor: {}", e))?;
        let target = MethodDescriptor::parse(&self.target_descriptor)
            .map_err(|e| format!("target descriptor: {}", e))?;

        if original.ret != target.ret {
            return Err(format!(
                "return type changes from {} to {}",
                return_name(&original),
                return_name(&target)
            ));
        }

        let before = operands(self.original_kind, &original);
        let after = operands(self.target_kind, &target);
        if before.len() != after.len() {
            return Err(format!(
                "operand count changes from {} to {}",
                before.len(),
                after.len()
            ));
        }
        for (i, (a, b)) in before.iter().zip(after.iter()).enumerate() {
            let compatible = match (a, b) {
                (Operand::Receiver, Operand::Receiver) => true,
                (Operand::Receiver, Operand::Value(t)) | (Operand::Value(t), Operand::Receiver) => {
                    t.is_reference()
                }
                (Operand::Value(x), Operand::Value(y)) => x == y,
            };
            if !compatible {
                return Err(format!("operand {} changes from {} to {}", i, a, b));
            }
        }
        Ok(())
    }

    pub fn original_display(&self) -> String {
        format!(
            "opcode={},owner={},desc={},name={}",
            self.original_kind.opcode(),
            self.original_owner,
            self.original_descriptor,
            self.original_method
        )
    }

    pub fn target_display(&self) -> String {
        format!(
            "opcode={},owner={},desc={},name={}",
            self.target_kind.opcode(),
            self.target_owner,
            self.target_descriptor,
            self.target_method
        )
    }
}

impl fmt::Display for RedirectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.original_display(), self.target_display())
    }
}

enum Operand<'a> {
    Receiver,
    Value(&'a FieldType),
}

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Receiver => write!(f, "<receiver>"),
            Operand::Value(t) => write!(f, "{}", t),
        }
    }
}

fn operands(kind: InvocationKind, descriptor: &MethodDescriptor) -> Vec<Operand<'_>> {
    let mut out = Vec::with_capacity(descriptor.params.len() + 1);
    if kind.has_receiver() {
        out.push(Operand::Receiver);
    }
    out.extend(descriptor.params.iter().map(Operand::Value));
    out
}

fn return_name(d: &MethodDescriptor) -> String {
    d.ret
        .as_ref()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "V".to_string())
}

/// A call instruction under examination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub owner: String,
    pub method: String,
    pub descriptor: String,
    pub kind: InvocationKind,
    /// Class containing the instruction
    pub class_name: String,
    /// Method containing the instruction
    pub enclosing_method: String,
    /// Bytecode offset within the enclosing method
    pub offset: usize,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "opcode={},owner={},desc={},name={}",
            self.kind.opcode(),
            self.owner,
            self.descriptor,
            self.method
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "Lcom/privacyhook/annotation/PrivacyMethodReplace;";

    fn wrapper<'a>(name: &'a str, descriptor: &'a str) -> WrapperMethod<'a> {
        WrapperMethod {
            class_name: "com/privacyhook/PrivacyManager",
            name,
            descriptor,
            is_static: true,
            in_interface: false,
        }
    }

    fn marker(owner: &str, access: Option<i32>, method: Option<&str>) -> Annotation {
        let mut a = Annotation::new(MARKER)
            .with_element(MARKER_ORIGINAL_CLASS, ElementValue::Class(format!("L{};", owner)));
        if let Some(m) = method {
            a = a.with_element(MARKER_ORIGINAL_METHOD, ElementValue::String(m.to_string()));
        }
        if let Some(v) = access {
            a = a.with_element(MARKER_ORIGINAL_ACCESS, ElementValue::Int { tag: 'I', value: v });
        }
        a
    }

    #[test]
    fn test_virtual_marker_strips_receiver() {
        let rule = RedirectionRule::from_marker(
            wrapper(
                "getLastKnownLocation",
                "(Landroid/location/LocationManager;Ljava/lang/String;)Landroid/location/Location;",
            ),
            &marker("android/location/LocationManager", Some(182), None),
        )
        .unwrap();
        assert_eq!(rule.original_owner, "android/location/LocationManager");
        assert_eq!(rule.original_method, "getLastKnownLocation");
        assert_eq!(
            rule.original_descriptor,
            "(Ljava/lang/String;)Landroid/location/Location;"
        );
        assert_eq!(rule.original_kind, InvocationKind::Virtual);
        assert_eq!(rule.target_kind, InvocationKind::Static);
        assert!(rule.check_stack_shape().is_ok());
    }

    #[test]
    fn test_static_marker_keeps_descriptor_and_defaults() {
        let rule = RedirectionRule::from_marker(
            wrapper(
                "getSysString",
                "(Landroid/content/ContentResolver;Ljava/lang/String;)Ljava/lang/String;",
            ),
            &marker("android/provider/Settings$System", None, Some("getString")),
        )
        .unwrap();
        assert_eq!(rule.original_kind, InvocationKind::Static);
        assert_eq!(rule.original_method, "getString");
        assert_eq!(rule.original_descriptor, rule.target_descriptor);
    }

    #[test]
    fn test_empty_method_override_falls_back_to_wrapper_name() {
        let rule = RedirectionRule::from_marker(
            wrapper("getSSID", "(Landroid/net/wifi/WifiInfo;)Ljava/lang/String;"),
            &marker("android/net/wifi/WifiInfo", Some(182), Some("")),
        )
        .unwrap();
        assert_eq!(rule.original_method, "getSSID");
    }

    #[test]
    fn test_missing_owner_is_configuration_error() {
        let bare = Annotation::new(MARKER);
        let err = RedirectionRule::from_marker(wrapper("getImei", "()Ljava/lang/String;"), &bare)
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("com/privacyhook/PrivacyManager#getImei"));
        assert!(err.to_string().contains("no oriClass"));
    }

    #[test]
    fn test_malformed_markers_are_rejected() {
        let w = wrapper("getMeid", "(Landroid/telephony/TelephonyManager;)Ljava/lang/String;");

        let primitive = Annotation::new(MARKER)
            .with_element(MARKER_ORIGINAL_CLASS, ElementValue::Class("I".to_string()));
        assert!(RedirectionRule::from_marker(w, &primitive).is_err());

        let string_owner = Annotation::new(MARKER).with_element(
            MARKER_ORIGINAL_CLASS,
            ElementValue::String("android/telephony/TelephonyManager".to_string()),
        );
        assert!(RedirectionRule::from_marker(w, &string_owner).is_err());

        let bad_opcode = marker("android/telephony/TelephonyManager", Some(42), None);
        assert!(RedirectionRule::from_marker(w, &bad_opcode).is_err());

        let no_receiver = RedirectionRule::from_marker(
            wrapper("getMeid", "(I)Ljava/lang/String;"),
            &marker("android/telephony/TelephonyManager", Some(182), None),
        );
        assert!(no_receiver.is_err());

        let mut instance = w;
        instance.is_static = false;
        let err = RedirectionRule::from_marker(
            instance,
            &marker("android/telephony/TelephonyManager", Some(182), None),
        )
        .unwrap_err();
        assert!(err.to_string().contains("must be static"));
    }

    #[test]
    fn test_identity_modes() {
        let a = RedirectionRule::from_marker(
            wrapper("getX", "(Lcom/a/A;)I"),
            &marker("com/a/A", Some(182), None),
        )
        .unwrap();
        let mut b = a.clone();
        b.original_owner = "com/b/B".to_string();
        b.original_descriptor = "()J".to_string();

        assert!(RuleIdentity::MethodName.same_rule(&a, &b));
        assert!(!RuleIdentity::Qualified.same_rule(&a, &b));
        assert!(RuleIdentity::Qualified.same_rule(&a, &a.clone()));
    }

    #[test]
    fn test_stack_shape_rejects_mismatches() {
        let mut rule = RedirectionRule {
            original_owner: "android/app/ActivityManager".to_string(),
            original_method: "getRunningTasks".to_string(),
            original_descriptor: "(I)Ljava/util/List;".to_string(),
            original_kind: InvocationKind::Virtual,
            target_owner: "com/privacyhook/PrivacyManager".to_string(),
            target_method: "getRunningTasks".to_string(),
            target_descriptor: "(Landroid/app/ActivityManager;I)Ljava/util/List;".to_string(),
            target_kind: InvocationKind::Static,
            target_interface: false,
        };
        assert!(rule.check_stack_shape().is_ok());

        rule.target_descriptor = "(Landroid/app/ActivityManager;J)Ljava/util/List;".to_string();
        assert!(rule.check_stack_shape().unwrap_err().contains("operand 1"));

        rule.target_descriptor = "(I)Ljava/util/List;".to_string();
        assert!(rule.check_stack_shape().unwrap_err().contains("operand count"));

        rule.target_descriptor = "(Landroid/app/ActivityManager;I)V".to_string();
        assert!(rule.check_stack_shape().unwrap_err().contains("return type"));

        rule.target_descriptor = "(II)Ljava/util/List;".to_string();
        assert!(rule.check_stack_shape().is_err(), "receiver must map to a reference");
    }

    #[test]
    fn test_matches_requires_all_but_owner_exactly() {
        let rule = RedirectionRule::from_marker(
            wrapper("getSSID", "(Landroid/net/wifi/WifiInfo;)Ljava/lang/String;"),
            &marker("android/net/wifi/WifiInfo", Some(182), None),
        )
        .unwrap();
        let mut site = CallSite {
            owner: "android/net/wifi/WifiInfo".to_string(),
            method: "getSSID".to_string(),
            descriptor: "()Ljava/lang/String;".to_string(),
            kind: InvocationKind::Virtual,
            class_name: "com/example/Foo".to_string(),
            enclosing_method: "run()V".to_string(),
            offset: 1,
        };
        assert!(rule.matches(&site, WILDCARD_OWNER));

        site.owner = "com/example/MyWifiInfo".to_string();
        assert!(!rule.matches(&site, WILDCARD_OWNER), "owner differs, no wildcard");

        site.owner = "android/net/wifi/WifiInfo".to_string();
        site.kind = InvocationKind::Interface;
        assert!(!rule.matches(&site, WILDCARD_OWNER), "kind is never wildcarded");
    }
}
