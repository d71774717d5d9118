use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::ConnectMethod;

/// Request attributes that select a session.
///
/// Requests agreeing on all four fields share one session and therefore
/// one device connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct SessionKey {
    pub device_name: String,
    pub connect_method: ConnectMethod,
    pub user: String,
    #[serde(default)]
    pub privilege_level: Option<u8>,
}

impl SessionKey {
    pub fn new(
        device_name: impl Into<String>,
        connect_method: ConnectMethod,
        user: impl Into<String>,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            connect_method,
            user: user.into(),
            privilege_level: None,
        }
    }

    pub fn with_privilege_level(mut self, level: u8) -> Self {
        self.privilege_level = Some(level);
        self
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}/", self.user, self.device_name, self.connect_method)?;
        match self.privilege_level {
            Some(level) => write!(f, "{level}"),
            None => f.write_str("-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn display_names_user_device_method_and_privilege() {
        let key = SessionKey::new("core1", ConnectMethod::Sshv2, "ops");
        assert_eq!(key.to_string(), "ops@core1/sshv2/-");
        assert_eq!(
            key.with_privilege_level(15).to_string(),
            "ops@core1/sshv2/15"
        );
    }

    #[test]
    fn privilege_level_distinguishes_keys() {
        let base = SessionKey::new("core1", ConnectMethod::Telnet, "ops");
        let keys: HashSet<SessionKey> = [
            base.clone(),
            base.clone(),
            base.clone().with_privilege_level(1),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys.len(), 2);
    }
}
