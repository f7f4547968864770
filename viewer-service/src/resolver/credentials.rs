//! Credential-file decryption and parsing.
//!
//! The encrypted blob at the fixed path is decrypted by host-supplied
//! collaborators and the plaintext parsed two ways: JSON with a set
//! of accepted key aliases, then delimiter-separated positional
//! fields. Parsing never errors outward; an unusable blob simply
//! leaves the settings untouched.

use std::sync::Arc;

use common::models::connection::DEFAULT_PORT;
use common::models::ConnectionSettings;
use serde_json::Value;

/// 3-character tag some deployments write in front of the blob.
pub const CREDENTIAL_PREFIX_TAG: &str = "S1:";

/// Ordered delimiter set for the positional format.
const DELIMITERS: [char; 6] = [':', '|', ',', ';', '\n', '\t'];

/// An opaque decryption collaborator supplied by the host.
/// The ciphers themselves live outside this tool.
pub trait Decrypt: Send + Sync {
    fn decrypt(&self, blob: &str) -> anyhow::Result<String>;
}

/// Passthrough for deployments that store the file unencrypted.
pub struct PlaintextDecryptor;

impl Decrypt for PlaintextDecryptor {
    fn decrypt(&self, blob: &str) -> anyhow::Result<String> {
        Ok(blob.to_string())
    }
}

/// The primary/secondary decryption entry points, tried in order.
#[derive(Clone, Default)]
pub struct DecryptorChain {
    pub primary: Option<Arc<dyn Decrypt>>,
    pub secondary: Option<Arc<dyn Decrypt>>,
}

impl DecryptorChain {
    /// Decrypts a blob through the primary entry point when present,
    /// else the secondary one — retrying the secondary with the
    /// 3-character prefix tag stripped when the first pass yields an
    /// empty result. Returns the failure reason instead of erroring.
    pub fn decrypt(&self, blob: &str) -> Result<String, String> {
        if let Some(primary) = &self.primary {
            return match primary.decrypt(blob) {
                Ok(text) if !text.is_empty() => Ok(text),
                Ok(_) => Err("primary decryption produced empty output".to_string()),
                Err(e) => Err(format!("primary decryption failed: {e}")),
            };
        }

        if let Some(secondary) = &self.secondary {
            // the prefix-strip retry fires only on empty output,
            // never on an error
            return match secondary.decrypt(blob) {
                Ok(text) if !text.is_empty() => Ok(text),
                Ok(_) => {
                    if let Some(stripped) = blob.strip_prefix(CREDENTIAL_PREFIX_TAG) {
                        match secondary.decrypt(stripped) {
                            Ok(text) if !text.is_empty() => Ok(text),
                            Ok(_) => {
                                Err("secondary decryption produced empty output".to_string())
                            }
                            Err(e) => Err(format!("secondary decryption failed: {e}")),
                        }
                    } else {
                        Err("secondary decryption produced empty output".to_string())
                    }
                }
                Err(e) => Err(format!("secondary decryption failed: {e}")),
            };
        }

        Err("no decryption provider registered".to_string())
    }
}

/// Connection parameters recovered from a decrypted blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialValues {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl CredentialValues {
    /// Overwrites the connection fields of a settings copy.
    pub fn apply(&self, settings: &mut ConnectionSettings) {
        settings.host = self.host.clone();
        settings.port = self.port;
        settings.username = self.username.clone();
        settings.password = self.password.clone();
        settings.database = self.database.clone();
    }
}

/// Parses decrypted text as JSON first, then as delimiter-separated
/// positional fields. `None` means nothing recognizable was found.
pub fn parse_credentials(text: &str) -> Option<CredentialValues> {
    parse_json(text).or_else(|| parse_delimited(text))
}

fn parse_json(text: &str) -> Option<CredentialValues> {
    let value: Value = serde_json::from_str(text).ok()?;
    let obj = value.as_object()?;

    Some(CredentialValues {
        host: string_alias(obj, &["host", "hostname"]).unwrap_or_else(|| "localhost".to_string()),
        port: port_alias(obj, &["db_port", "port"]).unwrap_or(DEFAULT_PORT),
        username: string_alias(obj, &["db_user", "user", "username"]).unwrap_or_default(),
        password: string_alias(obj, &["db_pass", "pass", "password"]).unwrap_or_default(),
        database: string_alias(obj, &["db_name", "db", "database", "dbname"]).unwrap_or_default(),
    })
}

fn string_alias(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn port_alias(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<u16> {
    let value = keys.iter().find_map(|k| obj.get(*k))?;
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u16::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_delimited(text: &str) -> Option<CredentialValues> {
    let delimiter = DELIMITERS.iter().find(|d| text.contains(**d))?;
    let parts: Vec<&str> = text.split(*delimiter).map(str::trim).collect();
    if parts.len() < 4 {
        return None;
    }

    Some(CredentialValues {
        username: parts[0].to_string(),
        password: parts[1].to_string(),
        database: parts[2].to_string(),
        host: if parts[3].is_empty() {
            "localhost".to_string()
        } else {
            parts[3].to_string()
        },
        // an unparsable port part counts as absent
        port: parts
            .get(4)
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDecryptor(&'static str);

    impl Decrypt for FixedDecryptor {
        fn decrypt(&self, _blob: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct PrefixSensitiveDecryptor;

    impl Decrypt for PrefixSensitiveDecryptor {
        fn decrypt(&self, blob: &str) -> anyhow::Result<String> {
            if blob.starts_with(CREDENTIAL_PREFIX_TAG) {
                Ok(String::new())
            } else {
                Ok(format!("user:pass:appdb:db.internal:{}", blob.len()))
            }
        }
    }

    #[test]
    fn json_with_preferred_keys() {
        let parsed = parse_credentials(
            r#"{"host":"db.example","db_port":3307,"db_user":"nxt","db_pass":"s3c","db_name":"panel"}"#,
        )
        .unwrap();
        assert_eq!(parsed.host, "db.example");
        assert_eq!(parsed.port, 3307);
        assert_eq!(parsed.username, "nxt");
        assert_eq!(parsed.password, "s3c");
        assert_eq!(parsed.database, "panel");
    }

    #[test]
    fn json_alias_fallback_order() {
        // db_user outranks username, dbname is the last database alias
        let parsed = parse_credentials(
            r#"{"hostname":"h","port":"8001","username":"late","db_user":"early","password":"p","dbname":"d"}"#,
        )
        .unwrap();
        assert_eq!(parsed.host, "h");
        assert_eq!(parsed.port, 8001);
        assert_eq!(parsed.username, "early");
        assert_eq!(parsed.database, "d");
    }

    #[test]
    fn json_missing_keys_use_defaults() {
        let parsed = parse_credentials(r#"{"db_user":"u"}"#).unwrap();
        assert_eq!(parsed.host, "localhost");
        assert_eq!(parsed.port, DEFAULT_PORT);
        assert_eq!(parsed.password, "");
        assert_eq!(parsed.database, "");
    }

    #[test]
    fn colon_separated_maps_positionally() {
        let parsed = parse_credentials("user:pass:mydb:db.host:3311").unwrap();
        assert_eq!(parsed.username, "user");
        assert_eq!(parsed.password, "pass");
        assert_eq!(parsed.database, "mydb");
        assert_eq!(parsed.host, "db.host");
        assert_eq!(parsed.port, 3311);
    }

    #[test]
    fn four_parts_default_the_port() {
        let parsed = parse_credentials("user|pass|mydb|db.host").unwrap();
        assert_eq!(parsed.host, "db.host");
        assert_eq!(parsed.port, DEFAULT_PORT);
    }

    #[test]
    fn first_matching_delimiter_wins() {
        // ':' precedes '|' in the ordered set
        let parsed = parse_credentials("a:b|c:d:h:9").unwrap();
        assert_eq!(parsed.username, "a");
        assert_eq!(parsed.password, "b|c");
        assert_eq!(parsed.database, "d");
        assert_eq!(parsed.port, 9);
    }

    #[test]
    fn unparsable_port_part_defaults() {
        let parsed = parse_credentials("u:p:d:h:abc").unwrap();
        assert_eq!(parsed.port, DEFAULT_PORT);
    }

    #[test]
    fn fewer_than_four_parts_is_unusable() {
        assert!(parse_credentials("user:pass:db").is_none());
        assert!(parse_credentials("no delimiters here at all").is_none());
    }

    #[test]
    fn newline_and_tab_are_accepted_delimiters() {
        let parsed = parse_credentials("u\np\nd\nh\n4000").unwrap();
        assert_eq!(parsed.port, 4000);
        let parsed = parse_credentials("u\tp\td\th").unwrap();
        assert_eq!(parsed.host, "h");
    }

    #[test]
    fn primary_decryptor_wins_over_secondary() {
        let chain = DecryptorChain {
            primary: Some(Arc::new(FixedDecryptor("from-primary"))),
            secondary: Some(Arc::new(FixedDecryptor("from-secondary"))),
        };
        assert_eq!(chain.decrypt("blob").unwrap(), "from-primary");
    }

    #[test]
    fn secondary_retries_with_prefix_stripped() {
        let chain = DecryptorChain {
            primary: None,
            secondary: Some(Arc::new(PrefixSensitiveDecryptor)),
        };
        let out = chain.decrypt("S1:ciphertext").unwrap();
        assert!(out.starts_with("user:pass:appdb:db.internal:"));
    }

    #[test]
    fn secondary_error_does_not_trigger_the_retry() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingFailure(AtomicUsize);

        impl Decrypt for CountingFailure {
            fn decrypt(&self, _blob: &str) -> anyhow::Result<String> {
                self.0.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("bad key")
            }
        }

        let counter = Arc::new(CountingFailure(AtomicUsize::new(0)));
        let chain = DecryptorChain {
            primary: None,
            secondary: Some(counter.clone()),
        };
        let reason = chain.decrypt("S1:ciphertext").unwrap_err();
        assert!(reason.contains("bad key"));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn secondary_without_prefix_does_not_retry() {
        let chain = DecryptorChain {
            primary: None,
            secondary: Some(Arc::new(FixedDecryptor(""))),
        };
        assert!(chain.decrypt("plainblob").is_err());
    }

    #[test]
    fn empty_chain_reports_missing_provider() {
        let chain = DecryptorChain::default();
        let reason = chain.decrypt("blob").unwrap_err();
        assert!(reason.contains("no decryption provider"));
    }

    #[test]
    fn applying_values_overwrites_connection_fields_only() {
        let values = CredentialValues {
            host: "h".into(),
            port: 4000,
            username: "u".into(),
            password: "p".into(),
            database: "d".into(),
        };
        let mut settings = ConnectionSettings::default();
        let auto_detect = settings.auto_detect;
        values.apply(&mut settings);
        assert_eq!(settings.host, "h");
        assert_eq!(settings.port, 4000);
        assert_eq!(settings.auto_detect, auto_detect);
    }
}
