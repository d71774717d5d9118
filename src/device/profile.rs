//! Built-in vendor profiles.
//!
//! A profile is plain data: the prompts a vendor's CLI shows, the
//! commands that disable paging or fetch configuration, and a few
//! behaviour switches. [`NetworkDevice`](super::NetworkDevice) turns a
//! profile into a working capability.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::channel::Pattern;
use crate::config::ConnectMethod;
use crate::error::ApiError;

/// Names of the built-in profiles.
pub const BUILTIN_PROFILES: &[&str] = &["ios", "asa", "screenos", "nortel_esr", "junos"];

/// Prompts, commands and switches describing one vendor's CLI.
///
/// Prompt fields are regular expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VendorProfile {
    pub name: String,
    pub vendor: String,
    pub family: String,
    pub login_prompt: String,
    pub password_prompt: String,
    /// CLI prompt.
    pub prompt: String,
    /// Last prompt character when running privileged.
    pub enable_char: char,
    pub enable_command: String,
    /// Pager prompt to acknowledge when paging cannot be disabled.
    #[serde(default)]
    pub pager: Option<String>,
    #[serde(default)]
    pub pager_disable_command: Option<String>,
    pub running_config_command: String,
    #[serde(default)]
    pub startup_config_command: Option<String>,
    pub default_connect_method: ConnectMethod,
    #[serde(default)]
    pub strip_ansi: bool,
    #[serde(default)]
    pub dos2unix: bool,
    pub logout_command: String,
    pub privilege_escalation: bool,
}

/// Summary of a built-in profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProfileMetadata {
    pub name: String,
    pub vendor: String,
    pub family: String,
    pub default_connect_method: ConnectMethod,
    pub privilege_escalation: bool,
}

/// A profile's prompts, compiled.
#[derive(Debug, Clone)]
pub(crate) struct CompiledPrompts {
    pub login: Pattern,
    pub password: Pattern,
    pub prompt: Pattern,
    pub pager: Option<Pattern>,
}

impl VendorProfile {
    /// Whether an enable secret should be used to gain privileges.
    pub fn can_escalate_privilege(&self) -> bool {
        self.privilege_escalation
    }

    pub fn metadata(&self) -> ProfileMetadata {
        ProfileMetadata {
            name: self.name.clone(),
            vendor: self.vendor.clone(),
            family: self.family.clone(),
            default_connect_method: self.default_connect_method,
            privilege_escalation: self.privilege_escalation,
        }
    }

    /// Config command for a source name (`running` or `startup`).
    pub fn config_command(&self, source: &str) -> Result<&str, ApiError> {
        match source {
            "running" => Ok(&self.running_config_command),
            "startup" => self.startup_config_command.as_deref().ok_or_else(|| {
                ApiError::invalid_request(format!("{} has no startup configuration", self.name))
            }),
            other => Err(ApiError::invalid_request(format!(
                "unknown configuration source {other:?}"
            ))),
        }
    }

    pub(crate) fn compile(&self) -> Result<CompiledPrompts, ApiError> {
        let compile = |field: &str, pattern: &str| {
            Regex::new(pattern).map(Pattern::from).map_err(|e| {
                ApiError::invalid_device(format!("profile {}: bad {field} pattern: {e}", self.name))
            })
        };
        Ok(CompiledPrompts {
            login: compile("login_prompt", &self.login_prompt)?,
            password: compile("password_prompt", &self.password_prompt)?,
            prompt: compile("prompt", &self.prompt)?,
            pager: self
                .pager
                .as_deref()
                .map(|p| compile("pager", p))
                .transpose()?,
        })
    }
}

/// Cisco IOS. The base most other profiles adjust.
pub fn ios() -> VendorProfile {
    VendorProfile {
        name: "ios".to_string(),
        vendor: "Cisco".to_string(),
        family: "IOS".to_string(),
        login_prompt: "sername:".to_string(),
        password_prompt: "assword:".to_string(),
        prompt: r"(?m)^[\w.\-/@()]+[>#]\s?$".to_string(),
        enable_char: '#',
        enable_command: "enable".to_string(),
        pager: Some(r" --More-- ".to_string()),
        pager_disable_command: Some("terminal length 0".to_string()),
        running_config_command: "show running-config".to_string(),
        startup_config_command: Some("show startup-config".to_string()),
        default_connect_method: ConnectMethod::Telnet,
        strip_ansi: false,
        dos2unix: false,
        logout_command: "exit".to_string(),
        privilege_escalation: true,
    }
}

/// Cisco ASA.
pub fn asa() -> VendorProfile {
    VendorProfile {
        name: "asa".to_string(),
        family: "ASA".to_string(),
        pager: Some(r"<--- More --->".to_string()),
        pager_disable_command: Some("terminal pager 0".to_string()),
        ..ios()
    }
}

/// Juniper/Netscreen ScreenOS.
pub fn screenos() -> VendorProfile {
    VendorProfile {
        name: "screenos".to_string(),
        vendor: "Juniper".to_string(),
        family: "ScreenOS".to_string(),
        prompt: r"\S+\s?->".to_string(),
        pager: Some(r"--- more ---".to_string()),
        pager_disable_command: Some("set console page 0".to_string()),
        running_config_command: "get config".to_string(),
        startup_config_command: Some("get config saved".to_string()),
        default_connect_method: ConnectMethod::Sshv2,
        // ScreenOS has no enable mode.
        privilege_escalation: false,
        ..ios()
    }
}

/// Nortel Passport / Ethernet Routing Switch.
pub fn nortel_esr() -> VendorProfile {
    VendorProfile {
        name: "nortel_esr".to_string(),
        vendor: "Nortel".to_string(),
        family: "Passport/ESR".to_string(),
        login_prompt: "Login:".to_string(),
        prompt: r".+\s?[$>#]".to_string(),
        pager: None,
        pager_disable_command: Some("config cli more false".to_string()),
        running_config_command: "show config".to_string(),
        startup_config_command: None,
        strip_ansi: true,
        dos2unix: true,
        logout_command: "logout".to_string(),
        privilege_escalation: false,
        ..ios()
    }
}

/// Juniper JunOS.
pub fn junos() -> VendorProfile {
    VendorProfile {
        name: "junos".to_string(),
        vendor: "Juniper".to_string(),
        family: "JunOS".to_string(),
        login_prompt: "login:".to_string(),
        prompt: r"(?m)^[\w.\-@]+[>#%]\s?$".to_string(),
        enable_char: '>',
        pager: Some(r"---\(more( \d+%)?\)---".to_string()),
        pager_disable_command: Some("set cli screen-length 0".to_string()),
        running_config_command: "show configuration".to_string(),
        startup_config_command: None,
        default_connect_method: ConnectMethod::Sshv2,
        privilege_escalation: false,
        ..ios()
    }
}

fn builtin(name: &str) -> Option<VendorProfile> {
    let profile = match name {
        "ios" => ios(),
        "asa" => asa(),
        "screenos" => screenos(),
        "nortel_esr" => nortel_esr(),
        "junos" => junos(),
        _ => return None,
    };
    Some(profile)
}

/// Resolves a built-in profile by vendor name (case-insensitive).
pub fn by_vendor(vendor: &str) -> Result<VendorProfile, ApiError> {
    let key = vendor.trim().to_ascii_lowercase();
    builtin(&key).ok_or_else(|| ApiError::no_such_vendor(format!("no profile for vendor {vendor:?}")))
}

/// Returns metadata for all built-in profiles.
pub fn catalog() -> Vec<ProfileMetadata> {
    BUILTIN_PROFILES
        .iter()
        .filter_map(|name| builtin(name))
        .map(|p| p.metadata())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn matches(pattern: &Pattern, text: &str) -> Option<String> {
        pattern.as_regex().find(text).map(|m| m.as_str().to_string())
    }

    #[test]
    fn every_builtin_compiles() {
        for name in BUILTIN_PROFILES {
            let profile = by_vendor(name).expect("builtin");
            assert_eq!(profile.name, *name);
            profile.compile().expect("prompts compile");
        }
        assert_eq!(catalog().len(), BUILTIN_PROFILES.len());
    }

    #[test]
    fn vendor_lookup_is_case_insensitive() {
        assert_eq!(by_vendor("IOS").expect("ios").name, "ios");
        let err = by_vendor("vyos").expect_err("unknown vendor");
        assert_eq!(err.kind(), ErrorKind::NoSuchVendor);
    }

    #[test]
    fn ios_prompt_matches_user_and_privileged_prompts() {
        let prompts = ios().compile().expect("compile");
        assert_eq!(
            matches(&prompts.prompt, "\r\nrouter-1.lab>").as_deref(),
            Some("router-1.lab>")
        );
        assert_eq!(matches(&prompts.prompt, "\r\nrouter#").as_deref(), Some("router#"));
        assert_eq!(matches(&prompts.prompt, "interface Gi0/1 is up\r\n"), None);
    }

    #[test]
    fn vendor_divergence_is_data() {
        assert_eq!(
            asa().pager_disable_command.as_deref(),
            Some("terminal pager 0")
        );
        let screenos = screenos();
        assert_eq!(screenos.default_connect_method, ConnectMethod::Sshv2);
        assert_eq!(screenos.enable_char, '#');
        assert!(!screenos.can_escalate_privilege());
        let prompts = screenos.compile().expect("compile");
        assert_eq!(matches(&prompts.prompt, "ns5gt-> ").as_deref(), Some("ns5gt->"));

        let esr = nortel_esr();
        assert!(!esr.can_escalate_privilege());
        assert!(esr.strip_ansi && esr.dos2unix);
        assert_eq!(esr.login_prompt, "Login:");
        assert!(ios().can_escalate_privilege());
    }

    #[test]
    fn config_sources_resolve_to_commands() {
        let ios = ios();
        assert_eq!(ios.config_command("running"), Ok("show running-config"));
        assert_eq!(ios.config_command("startup"), Ok("show startup-config"));
        let err = junos().config_command("startup").expect_err("no startup");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(ios.config_command("candidate").is_err());
    }

    #[test]
    fn invalid_prompt_patterns_are_rejected() {
        let profile = VendorProfile {
            prompt: "[".to_string(),
            ..ios()
        };
        let err = profile.compile().expect_err("bad regex");
        assert_eq!(err.kind(), ErrorKind::InvalidDevice);
    }
}
