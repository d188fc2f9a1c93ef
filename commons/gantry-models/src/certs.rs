use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// TLS certificate explicitly attached to domains by an operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppDomainCert {
    pub id: Uuid,
    pub region: String,
    pub name: String,
    pub cert_data: String,
    pub key_data: String,
}

/// TLS certificate auto-matched against hostnames by its CN patterns.
/// A wildcard pattern covers exactly one label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppDomainSharedCert {
    pub id: Uuid,
    pub region: String,
    pub name: String,
    pub cert_data: String,
    pub key_data: String,
    pub auto_match_cns: Vec<String>,
}

impl AppDomainSharedCert {
    pub fn matches_hostname(&self, hostname: &str) -> bool {
        self.auto_match_cns
            .iter()
            .any(|cn| cn_matches(cn, hostname))
    }
}

fn cn_matches(pattern: &str, hostname: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(suffix) => match hostname.split_once('.') {
            Some((first, rest)) => !first.is_empty() && rest == suffix,
            None => false,
        },
        None => pattern == hostname,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_covers_one_label() {
        assert!(cn_matches("*.example.com", "api.example.com"));
        assert!(!cn_matches("*.example.com", "example.com"));
        assert!(!cn_matches("*.example.com", "a.b.example.com"));
    }

    #[test]
    fn exact_pattern() {
        assert!(cn_matches("example.com", "example.com"));
        assert!(!cn_matches("example.com", "api.example.com"));
    }

    #[test]
    fn any_cn_matches() {
        let cert = AppDomainSharedCert {
            id: Uuid::new_v4(),
            region: "default".to_string(),
            name: "shared".to_string(),
            cert_data: String::new(),
            key_data: String::new(),
            auto_match_cns: vec!["other.io".to_string(), "*.example.com".to_string()],
        };
        assert!(cert.matches_hostname("api.example.com"));
        assert!(cert.matches_hostname("other.io"));
        assert!(!cert.matches_hostname("example.com"));
    }
}
