//! Configuration types and CLI parsing.
//!
//! Flags are parsed with clap (with environment fallbacks for credentials),
//! then validated into immutable typed config. Validation reports every
//! problem at once and runs before any network activity.

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::mailstore::SearchFilter;

/// Maximum number of messages processed per run unless overridden.
pub const DEFAULT_BATCH_LIMIT: usize = 10;

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Expected format of `--since`.
const SINCE_FORMAT: &str = "%Y-%m-%d";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Command-line flags as parsed, before validation.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mail-triage",
    about = "Classify mailbox messages with an LLM and route them to folders",
    version,
    args_override_self = true
)]
pub struct Cli {
    /// IMAP username.
    #[arg(long, env = "EMAIL_USERNAME")]
    pub username: Option<String>,

    /// IMAP password.
    #[arg(long, env = "EMAIL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// IMAP server host.
    #[arg(long = "imap-server", env = "EMAIL_IMAP_HOST")]
    pub imap_server: Option<String>,

    /// IMAP port.
    #[arg(long, env = "EMAIL_IMAP_PORT", default_value_t = 993)]
    pub port: u16,

    /// Use TLS for the IMAP connection.
    #[arg(long = "use-tls", default_value_t = true, action = clap::ArgAction::Set)]
    pub use_tls: bool,

    /// Mailbox to triage.
    #[arg(long, default_value = "INBOX")]
    pub mailbox: String,

    /// Fetch only unread messages.
    #[arg(long)]
    pub unread: bool,

    /// Fetch only messages received today.
    #[arg(long)]
    pub today: bool,

    /// Fetch messages since a date (YYYY-MM-DD). Overrides --today.
    #[arg(long)]
    pub since: Option<String>,

    /// API key for the model provider.
    #[arg(long = "api-key", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model used for classification.
    #[arg(long, env = "MAIL_TRIAGE_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Model provider.
    #[arg(long, value_enum, default_value_t = LlmBackend::OpenAi)]
    pub provider: LlmBackend,

    /// Sender substring that marks a message as priority. Repeatable.
    #[arg(long = "priority-sender", default_values_t = [String::from("important@company.com")])]
    pub priority_senders: Vec<String>,

    /// Subject keyword (case-insensitive) that marks a message as important. Repeatable.
    #[arg(long = "keyword", default_values_t = [String::from("urgent"), String::from("immediate action")])]
    pub keywords: Vec<String>,

    /// Destination for messages classified as junk.
    #[arg(long = "spam-folder", default_value = "Spam")]
    pub spam_folder: String,

    /// Destination for every other message.
    #[arg(long = "archive-folder", default_value = "Archive")]
    pub archive_folder: String,

    /// Maximum number of messages processed per run.
    #[arg(long = "batch-limit", default_value_t = DEFAULT_BATCH_LIMIT)]
    pub batch_limit: usize,

    /// Create destination folders that do not exist instead of failing.
    #[arg(long = "create-folders")]
    pub create_folders: bool,

    /// Decide and report, but do not move anything.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Print decisions as JSON lines.
    #[arg(long)]
    pub json: bool,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Mail-store connection settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub username: String,
    pub password: SecretString,
    pub mailbox: String,
}

/// Destination folders and priority rules.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub spam_folder: String,
    pub archive_folder: String,
    pub priority_senders: Vec<String>,
    pub keywords: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            spam_folder: "Spam".to_string(),
            archive_folder: "Archive".to_string(),
            priority_senders: vec!["important@company.com".to_string()],
            keywords: vec!["urgent".to_string(), "immediate action".to_string()],
        }
    }
}

/// Per-run behaviour of the orchestrator.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub filter: SearchFilter,
    pub batch_limit: usize,
    pub dry_run: bool,
    pub create_folders: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            filter: SearchFilter::default(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            dry_run: false,
            create_folders: false,
        }
    }
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mail: MailConfig,
    pub llm: LlmConfig,
    pub routing: RoutingConfig,
    pub run: RunSettings,
    pub json: bool,
    pub log_format: LogFormat,
}

impl Cli {
    /// Validate flags into an [`AppConfig`].
    ///
    /// `today` anchors `--today`; callers pass the current local date.
    pub fn into_config(self, today: NaiveDate) -> Result<AppConfig, ConfigError> {
        let mut errors = Vec::new();

        let username = required(self.username, "username", "--username", &mut errors);
        let password = required(self.password, "password", "--password", &mut errors);
        let host = required(self.imap_server, "IMAP server", "--imap-server", &mut errors);
        let api_key = required(self.api_key, "API key", "--api-key", &mut errors);

        let since = match self.since.as_deref() {
            Some(raw) => match parse_since(raw) {
                Ok(date) => Some(date),
                Err(e) => {
                    errors.push(e);
                    None
                }
            },
            None => None,
        };

        if self.batch_limit == 0 {
            errors.push(ConfigError::InvalidValue {
                key: "batch-limit".into(),
                message: "must be at least 1".into(),
            });
        }

        if self.model.trim().is_empty() {
            errors.push(ConfigError::InvalidValue {
                key: "model".into(),
                message: "must not be empty".into(),
            });
        }

        if let Some(err) = ConfigError::aggregate(errors) {
            return Err(err);
        }

        let filter = SearchFilter::from_flags(self.unread, self.today, since, today);

        Ok(AppConfig {
            mail: MailConfig {
                host: host.unwrap_or_default(),
                port: self.port,
                use_tls: self.use_tls,
                username: username.unwrap_or_default(),
                password: SecretString::from(password.unwrap_or_default()),
                mailbox: self.mailbox,
            },
            llm: LlmConfig {
                backend: self.provider,
                api_key: SecretString::from(api_key.unwrap_or_default()),
                model: self.model,
            },
            routing: RoutingConfig {
                spam_folder: self.spam_folder,
                archive_folder: self.archive_folder,
                priority_senders: non_empty(self.priority_senders),
                keywords: non_empty(self.keywords),
            },
            run: RunSettings {
                filter,
                batch_limit: self.batch_limit,
                dry_run: self.dry_run,
                create_folders: self.create_folders,
            },
            json: self.json,
            log_format: self.log_format,
        })
    }
}

/// Parse a `--since` value. Never falls back to "no filter".
pub fn parse_since(raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw.trim(), SINCE_FORMAT).map_err(|e| ConfigError::InvalidValue {
        key: "since".into(),
        message: format!("expected YYYY-MM-DD, got {raw:?} ({e})"),
    })
}

fn required(
    value: Option<String>,
    key: &str,
    flag: &str,
    errors: &mut Vec<ConfigError>,
) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            errors.push(ConfigError::MissingRequired {
                key: key.to_string(),
                hint: format!("Pass {flag}."),
            });
            None
        }
    }
}

fn non_empty(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["mail-triage"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn full(extra: &[&str]) -> Cli {
        let mut args = vec![
            "--username",
            "me@example.com",
            "--password",
            "hunter2",
            "--imap-server",
            "imap.example.com",
            "--api-key",
            "sk-test",
        ];
        args.extend_from_slice(extra);
        parse(&args)
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = full(&[]).into_config(today()).unwrap();
        assert_eq!(config.mail.port, 993);
        assert!(config.mail.use_tls);
        assert_eq!(config.mail.mailbox, "INBOX");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.backend, LlmBackend::OpenAi);
        assert_eq!(config.run.batch_limit, 10);
        assert_eq!(config.routing.spam_folder, "Spam");
        assert_eq!(config.routing.archive_folder, "Archive");
        assert_eq!(config.routing.priority_senders, vec!["important@company.com"]);
        assert_eq!(config.routing.keywords, vec!["urgent", "immediate action"]);
        assert!(!config.run.dry_run);
        assert!(!config.run.create_folders);
        assert_eq!(config.run.filter, SearchFilter::default());
    }

    #[test]
    fn secrets_are_carried_through() {
        let config = full(&[]).into_config(today()).unwrap();
        assert_eq!(config.mail.password.expose_secret(), "hunter2");
        assert_eq!(config.llm.api_key.expose_secret(), "sk-test");
        assert!(!format!("{:?}", config.mail).contains("hunter2"));
    }

    #[test]
    fn missing_required_fields_are_all_reported() {
        // Bypass env fallbacks by passing explicit empty values.
        let cli = parse(&[
            "--username",
            "",
            "--password",
            "",
            "--imap-server",
            "",
            "--api-key",
            "",
        ]);
        let err = cli.into_config(today()).unwrap_err();
        match err {
            ConfigError::Multiple(errors) => {
                assert_eq!(errors.len(), 4);
                let text = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n");
                assert!(text.contains("username"));
                assert!(text.contains("password"));
                assert!(text.contains("IMAP server"));
                assert!(text.contains("API key"));
            }
            other => panic!("Expected Multiple, got {other:?}"),
        }
    }

    #[test]
    fn single_missing_field_is_not_wrapped() {
        let cli = full(&["--api-key", ""]);
        let err = cli.into_config(today()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "API key"));
    }

    #[test]
    fn invalid_since_is_fatal() {
        let err = full(&["--since", "19/10/2026"]).into_config(today()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "since"));
    }

    #[test]
    fn invalid_since_is_reported_with_missing_fields() {
        let cli = parse(&["--since", "yesterday", "--username", "", "--password", "x"]);
        let cli = Cli {
            imap_server: Some("imap.example.com".into()),
            api_key: Some("sk".into()),
            ..cli
        };
        let err = cli.into_config(today()).unwrap_err();
        match err {
            ConfigError::Multiple(errors) => assert_eq!(errors.len(), 2),
            other => panic!("Expected Multiple, got {other:?}"),
        }
    }

    #[test]
    fn since_overrides_today() {
        let config = full(&["--today", "--since", "2026-01-02"])
            .into_config(today())
            .unwrap();
        assert_eq!(config.run.filter.since, NaiveDate::from_ymd_opt(2026, 1, 2));
    }

    #[test]
    fn today_uses_supplied_date() {
        let config = full(&["--today", "--unread"]).into_config(today()).unwrap();
        assert_eq!(config.run.filter.since, Some(today()));
        assert!(config.run.filter.unread_only);
    }

    #[test]
    fn use_tls_can_be_disabled() {
        let config = full(&["--use-tls", "false"]).into_config(today()).unwrap();
        assert!(!config.mail.use_tls);
    }

    #[test]
    fn zero_batch_limit_rejected() {
        let err = full(&["--batch-limit", "0"]).into_config(today()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "batch-limit"));
    }

    #[test]
    fn repeated_rule_flags_replace_defaults() {
        let config = full(&[
            "--priority-sender",
            "boss@corp.com",
            "--priority-sender",
            "@family.org",
            "--keyword",
            "invoice",
        ])
        .into_config(today())
        .unwrap();
        assert_eq!(
            config.routing.priority_senders,
            vec!["boss@corp.com", "@family.org"]
        );
        assert_eq!(config.routing.keywords, vec!["invoice"]);
    }

    #[test]
    fn anthropic_provider_selectable() {
        let config = full(&["--provider", "anthropic", "--model", "claude-3-5-haiku-latest"])
            .into_config(today())
            .unwrap();
        assert_eq!(config.llm.backend, LlmBackend::Anthropic);
        assert_eq!(config.llm.model, "claude-3-5-haiku-latest");
    }
}
