//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。
//! 身份凭据可写成 `env:NAME`，解析后从环境变量 (含 `.env`) 中取值。

use contracts::{ContractError, RelayBlueprint};

/// 凭据环境变量引用前缀
pub const ENV_CREDENTIAL_PREFIX: &str = "env:";

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

/// 根据格式解析配置，并展开凭据引用
pub fn parse(content: &str, format: ConfigFormat) -> Result<RelayBlueprint, ContractError> {
    let decoded = match format {
        ConfigFormat::Toml => toml::from_str::<RelayBlueprint>(content).map_err(boxed),
        ConfigFormat::Json => serde_json::from_str::<RelayBlueprint>(content).map_err(boxed),
    };
    let mut blueprint = decoded.map_err(|e| ContractError::ConfigParse {
        message: format!("{} parse error: {e}", format.label()),
        source: Some(e),
    })?;

    resolve_credentials(&mut blueprint, |name| std::env::var(name).ok())?;
    Ok(blueprint)
}

fn boxed<E>(e: E) -> Box<dyn std::error::Error + Send + Sync>
where
    E: std::error::Error + Send + Sync + 'static,
{
    Box::new(e)
}

/// 将 `env:NAME` 形式的凭据替换为 `lookup(NAME)` 的值
///
/// 变量缺失或为空时报告出错的身份，避免以空会话登录。
pub fn resolve_credentials(
    blueprint: &mut RelayBlueprint,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ContractError> {
    for (i, identity) in blueprint.identities.iter_mut().enumerate() {
        let Some(name) = identity.credential.strip_prefix(ENV_CREDENTIAL_PREFIX) else {
            continue;
        };
        let name = name.trim();
        match lookup(name) {
            Some(value) if !value.is_empty() => identity.credential = value,
            _ => {
                return Err(ContractError::config_validation(
                    format!("identities[{i}].credential"),
                    format!("environment variable '{name}' is not set"),
                ))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::RateLimitPolicy;

    #[test]
    fn test_parse_toml_sources_and_items() {
        let content = r#"
[relay]
max_concurrent_events = 4
rate_limit = "sleep_inline"

[[sources]]
feed = "deals"
items = [{ id = 10, marker = true }, { id = 11 }]
"#;
        let result = parse(content, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.relay.max_concurrent_events, 4);
        assert_eq!(bp.relay.rate_limit, RateLimitPolicy::SleepInline);
        assert_eq!(bp.sources[0].items.len(), 2);
        assert!(bp.sources[0].items[0].marker);
        assert!(!bp.sources[0].items[1].marker);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "identities": [{ "handle": "+1", "credential": "s" }],
            "destinations": [{ "link": "chat", "interval_minutes": 5 }]
        }"#;
        let result = parse(content, ConfigFormat::Json);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.destinations[0].interval_minutes, 5);
        assert_eq!(bp.destinations[0].batch_size, 1);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse(content, ConfigFormat::Toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_rate_limit_policy_rejected() {
        let content = r#"
[batch]
rate_limit = "ignore"
"#;
        assert!(parse(content, ConfigFormat::Toml).is_err());
    }

    fn lookup(name: &str) -> Option<String> {
        match name {
            "SESSION_A" => Some("from-env".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn test_env_credentials_resolved() {
        let content = r#"
[[identities]]
handle = "+1"
credential = "env:SESSION_A"

[[identities]]
handle = "+2"
credential = "inline"
"#;
        let mut bp: RelayBlueprint = toml::from_str(content).unwrap();
        resolve_credentials(&mut bp, lookup).unwrap();
        assert_eq!(bp.identities[0].credential, "from-env");
        assert_eq!(bp.identities[1].credential, "inline");
    }

    #[test]
    fn test_missing_env_credential_names_identity() {
        for credential in ["env:MISSING", "env:EMPTY"] {
            let content = format!(
                "[[identities]]\nhandle = \"+1\"\ncredential = \"{credential}\"\n"
            );
            let mut bp: RelayBlueprint = toml::from_str(&content).unwrap();
            let err = resolve_credentials(&mut bp, lookup).unwrap_err();
            assert!(
                matches!(err, ContractError::ConfigValidation { ref field, .. } if field == "identities[0].credential"),
                "got: {err}"
            );
        }
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
