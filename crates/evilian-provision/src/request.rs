//! Operator input validation
//!
//! Everything here is local: no remote call is made until a
//! [`ProvisioningRequest`] has been built.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

/// Azure region used when none is given
pub const DEFAULT_REGION: &str = "westeurope";
/// VM size used when none is given
pub const DEFAULT_VM_SIZE: &str = "Standard_B2s";
/// Marketplace image used when none is given
pub const DEFAULT_IMAGE: &str = "Debian:debian-12:12-gen2:latest";

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})(?:/(\d{1,2}))?$")
        .unwrap_or_else(|e| unreachable!("static range pattern: {e}"))
});

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9-]+$").unwrap_or_else(|e| unreachable!("static name pattern: {e}"))
});

/// Raw operator parameters, as they come off the command line
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub range: String,
    pub project_name: String,
    pub region: Option<String>,
    pub vm_size: Option<String>,
    pub image: Option<String>,
}

/// Validated input for a single run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningRequest {
    /// Operator source range allowed on the administrative port
    pub allowed_range: String,
    /// Lower-cased project identifier
    pub project_name: String,
    pub region: String,
    pub vm_size: String,
    pub image_reference: String,
}

impl ProvisioningRequest {
    /// Validate raw input, filling unset overrides with defaults
    pub fn validate(raw: &RawRequest) -> Result<Self, ValidationError> {
        let allowed_range = validate_range(&raw.range)?;
        let project_name = validate_name(&raw.project_name)?;

        Ok(Self {
            allowed_range,
            project_name,
            region: non_empty_or(raw.region.as_deref(), DEFAULT_REGION),
            vm_size: non_empty_or(raw.vm_size.as_deref(), DEFAULT_VM_SIZE),
            image_reference: non_empty_or(raw.image.as_deref(), DEFAULT_IMAGE),
        })
    }
}

fn non_empty_or(value: Option<&str>, default: &str) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Check a dotted-quad address with an optional `/0`..`/32` prefix
///
/// Each octet must be 0-255. The range is returned verbatim (trimmed).
pub fn validate_range(range: &str) -> Result<String, ValidationError> {
    let range = range.trim();
    let invalid = || ValidationError::InvalidRange(range.to_string());

    let caps = RANGE_RE.captures(range).ok_or_else(invalid)?;

    for idx in 1..=4 {
        let octet: u16 = caps[idx].parse().map_err(|_| invalid())?;
        if octet > 255 {
            return Err(invalid());
        }
    }

    if let Some(prefix) = caps.get(5) {
        let prefix: u8 = prefix.as_str().parse().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }
    }

    Ok(range.to_string())
}

/// Lower-case a project name and check it only holds letters, digits and hyphens
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let normalized = name.to_ascii_lowercase();
    if NAME_RE.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(ValidationError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn raw(range: &str, name: &str) -> RawRequest {
        RawRequest {
            range: range.into(),
            project_name: name.into(),
            ..RawRequest::default()
        }
    }

    #[test]
    fn test_accepts_host_and_cidr() {
        assert_eq!(validate_range("203.0.113.5").unwrap(), "203.0.113.5");
        assert_eq!(validate_range("203.0.113.5/32").unwrap(), "203.0.113.5/32");
        assert_eq!(validate_range("0.0.0.0/0").unwrap(), "0.0.0.0/0");
        assert_eq!(validate_range(" 10.0.0.0/8 ").unwrap(), "10.0.0.0/8");
    }

    #[test]
    fn test_rejects_malformed_ranges() {
        for bad in [
            "",
            "203.0.113",
            "203.0.113.5/33",
            "256.0.0.1",
            "203.0.113.5/",
            "2001:db8::/32",
            "a.b.c.d",
            "203.0.113.5/32/1",
            "1.2.3.4 /24",
        ] {
            assert!(
                matches!(validate_range(bad), Err(ValidationError::InvalidRange(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_name_is_lowercased() {
        assert_eq!(validate_name("Evil123").unwrap(), "evil123");
        assert_eq!(validate_name("my-Lab-2").unwrap(), "my-lab-2");
    }

    #[test]
    fn test_rejects_bad_names() {
        for bad in ["", "   ", "under_score", "dot.name", "spa ce", "ümlaut"] {
            assert!(
                matches!(validate_name(bad), Err(ValidationError::InvalidName(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_defaults_fill_missing_overrides() {
        let req = ProvisioningRequest::validate(&raw("203.0.113.5/32", "Evil123")).unwrap();
        assert_eq!(req.project_name, "evil123");
        assert_eq!(req.region, DEFAULT_REGION);
        assert_eq!(req.vm_size, DEFAULT_VM_SIZE);
        assert_eq!(req.image_reference, DEFAULT_IMAGE);
    }

    #[test]
    fn test_overrides_are_kept() {
        let mut input = raw("198.51.100.0/24", "lab");
        input.region = Some("northeurope".into());
        input.vm_size = Some(String::new());
        let req = ProvisioningRequest::validate(&input).unwrap();
        assert_eq!(req.region, "northeurope");
        assert_eq!(req.vm_size, DEFAULT_VM_SIZE);
    }

    proptest! {
        #[test]
        fn prop_dotted_quads_accepted(
            a in 0u16..=255, b in 0u16..=255, c in 0u16..=255, d in 0u16..=255,
            prefix in proptest::option::of(0u8..=32),
        ) {
            let range = match prefix {
                Some(p) => format!("{a}.{b}.{c}.{d}/{p}"),
                None => format!("{a}.{b}.{c}.{d}"),
            };
            prop_assert_eq!(validate_range(&range).unwrap(), range);
        }

        #[test]
        fn prop_non_numeric_ranges_rejected(s in "[a-zA-Z:_ ]{1,20}") {
            prop_assert!(validate_range(&s).is_err());
        }

        #[test]
        fn prop_valid_names_normalize(name in "[A-Za-z0-9-]{1,30}") {
            prop_assert_eq!(validate_name(&name).unwrap(), name.to_ascii_lowercase());
        }

        #[test]
        fn prop_names_with_other_chars_rejected(
            prefix in "[a-z0-9-]{0,5}",
            bad in "[_.!@/ ]",
            suffix in "[a-z0-9-]{0,5}",
        ) {
            let name = format!("{prefix}{bad}{suffix}");
            prop_assert!(validate_name(&name).is_err());
        }
    }
}
