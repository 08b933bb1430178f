use std::env;

use anyhow::{Context, Result};

const DEFAULT_API_URL: &str = "https://api.apper.io/v1";

/// データプラットフォームへの接続設定。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformConfig {
    pub api_url: String,
    pub project_id: String,
    pub public_key: String,
}

impl PlatformConfig {
    /// 環境変数から設定を読み込む。
    ///
    /// `TASKTIME_PROJECT_ID`と`TASKTIME_PUBLIC_KEY`が設定されていない場合はエラーを返す。
    /// `TASKTIME_API_URL`が設定されていない場合は既定のURLを利用する。
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// `lookup`で取得した値から設定を作成する。
    ///
    /// # Arguments
    ///
    /// * `lookup` - キーに対応する値を返す関数
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .with_context(|| format!("{} must be set", key))
        };

        let project_id = required("TASKTIME_PROJECT_ID")?;
        let public_key = required("TASKTIME_PUBLIC_KEY")?;
        let api_url = lookup("TASKTIME_API_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            project_id,
            public_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::PlatformConfig;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_default_url() {
        let config = PlatformConfig::from_lookup(lookup_from(&[
            ("TASKTIME_PROJECT_ID", "proj"),
            ("TASKTIME_PUBLIC_KEY", "key"),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "https://api.apper.io/v1");
        assert_eq!(config.project_id, "proj");
        assert_eq!(config.public_key, "key");
    }

    #[test]
    fn test_from_lookup_custom_url_trailing_slash() {
        let config = PlatformConfig::from_lookup(lookup_from(&[
            ("TASKTIME_PROJECT_ID", "proj"),
            ("TASKTIME_PUBLIC_KEY", "key"),
            ("TASKTIME_API_URL", "http://localhost:8080/api/"),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "http://localhost:8080/api");
    }

    #[rstest]
    #[case::no_project(&[("TASKTIME_PUBLIC_KEY", "key")], "TASKTIME_PROJECT_ID must be set")]
    #[case::no_key(&[("TASKTIME_PROJECT_ID", "proj")], "TASKTIME_PUBLIC_KEY must be set")]
    #[case::blank_key(
        &[("TASKTIME_PROJECT_ID", "proj"), ("TASKTIME_PUBLIC_KEY", "  ")],
        "TASKTIME_PUBLIC_KEY must be set",
    )]
    fn test_from_lookup_missing(#[case] pairs: &[(&str, &str)], #[case] expected: &str) {
        let error = PlatformConfig::from_lookup(lookup_from(pairs)).unwrap_err();

        assert_eq!(error.to_string(), expected);
    }
}
