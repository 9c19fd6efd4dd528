//! Precedence and validation of install options.
//!
//! Each `#[case]` builds its own sources; the process environment is never read.

use std::cell::RefCell;
use std::path::PathBuf;

use dts_installer::{
    ConfigError, ConfigSources, InstallConfig, InstallOptions, JoinError, Prompt, TerminalPrompt,
};
use rstest::rstest;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Replays `answers` to `ask`, answers `confirm` with `confirm`.
struct Replay {
    confirm: bool,
    answers: RefCell<Vec<String>>,
    notes: RefCell<Vec<String>>,
}

impl Replay {
    fn new(confirm: bool, answers: &[&str]) -> Self {
        Self {
            confirm,
            answers: RefCell::new(answers.iter().rev().map(|a| a.to_string()).collect()),
            notes: RefCell::new(Vec::new()),
        }
    }
}

impl Prompt for Replay {
    fn confirm(&self, _message: &str, _default: bool) -> bool {
        self.confirm
    }

    fn ask(&self, _message: &str) -> Option<String> {
        self.answers.borrow_mut().pop()
    }

    fn notify(&self, message: &str) {
        self.notes.borrow_mut().push(message.to_string());
    }
}

fn sources(env: Option<&str>, default: PathBuf) -> ConfigSources {
    ConfigSources {
        env_model_path: env.map(PathBuf::from),
        default_model_path: default,
        hostname: "studio".to_string(),
    }
}

fn quiet() -> InstallOptions {
    InstallOptions {
        quiet: true,
        ..InstallOptions::default()
    }
}

// ---------------------------------------------------------------------------
// Model path precedence
// ---------------------------------------------------------------------------

#[rstest]
#[case(Some("/a"), Some("/b"), "/b")]
#[case(Some("/a"), None, "/a")]
#[case(None, Some("/b"), "/b")]
fn model_path_flag_beats_environment(
    #[case] env: Option<&str>,
    #[case] flag: Option<&str>,
    #[case] expected: &str,
) {
    let options = InstallOptions {
        model_path: flag.map(PathBuf::from),
        ..quiet()
    };
    let config = InstallConfig::resolve(
        options,
        &sources(env, PathBuf::from("/nonexistent/Models")),
        &TerminalPrompt::new(true),
    )
    .expect("resolve");

    assert_eq!(config.model_path, PathBuf::from(expected));
}

#[test]
fn existing_default_model_dir_is_used_without_prompting() {
    let home = TempDir::new().expect("home");
    let prompt = Replay::new(true, &[]);

    let config = InstallConfig::resolve(quiet(), &sources(None, home.path().to_path_buf()), &prompt)
        .expect("resolve");

    assert_eq!(config.model_path, home.path());
    assert!(prompt.notes.borrow().is_empty());
}

#[test]
fn quiet_mode_without_any_model_dir_fails() {
    let err = InstallConfig::resolve(
        quiet(),
        &sources(None, PathBuf::from("/nonexistent/Models")),
        &TerminalPrompt::new(true),
    )
    .expect_err("no model dir");

    assert!(matches!(err, ConfigError::MissingModelPath { .. }));
    assert!(err.to_string().contains("DRAW_THINGS_MODEL_PATH"));
}

#[test]
fn prompt_retries_until_an_existing_dir_is_given() {
    let models = TempDir::new().expect("models");
    let answer = models.path().display().to_string();
    let prompt = Replay::new(true, &["/does/not/exist", answer.as_str()]);

    let config = InstallConfig::resolve(
        InstallOptions::default(),
        &sources(None, PathBuf::from("/nonexistent/Models")),
        &prompt,
    )
    .expect("resolve");

    assert_eq!(config.model_path, models.path());
    assert!(prompt
        .notes
        .borrow()
        .iter()
        .any(|n| n.contains("does not exist")));
}

#[rstest]
#[case(&["q"])]
#[case(&["Q"])]
fn quitting_the_model_prompt_cancels(#[case] answers: &[&str]) {
    let prompt = Replay::new(true, answers);
    let err = InstallConfig::resolve(
        InstallOptions::default(),
        &sources(None, PathBuf::from("/nonexistent/Models")),
        &prompt,
    )
    .expect_err("cancelled");

    assert!(matches!(err, ConfigError::Cancelled));
}

// ---------------------------------------------------------------------------
// Defaults and flags
// ---------------------------------------------------------------------------

#[test]
fn defaults_are_filled_in() {
    let config = InstallConfig::resolve(
        InstallOptions {
            model_path: Some(PathBuf::from("/models")),
            ..quiet()
        },
        &sources(None, PathBuf::from("/nonexistent")),
        &TerminalPrompt::new(true),
    )
    .expect("resolve");

    assert_eq!(config.port, 7859);
    assert_eq!(config.address, "0.0.0.0");
    assert_eq!(config.gpu, 0);
    assert_eq!(config.name, "studio");
    assert!(config.tls);
    assert!(config.response_compression);
    assert!(config.flash_attention);
    assert!(!config.model_browser);
    assert!(config.join.is_none());
    assert!(config.non_default_settings().is_empty());

    let connection = config.connection();
    assert_eq!(connection.host, "localhost");
    assert_eq!(connection.port, 7859);
    assert!(connection.use_tls);
}

#[test]
fn non_default_settings_mask_secrets() {
    let config = InstallConfig::resolve(
        InstallOptions {
            model_path: Some(PathBuf::from("/models")),
            name: Some("gpu-box".to_string()),
            shared_secret: Some("hunter2".to_string()),
            datadog_api_key: Some("dd-key".to_string()),
            no_flash_attention: true,
            ..quiet()
        },
        &sources(None, PathBuf::from("/nonexistent")),
        &TerminalPrompt::new(true),
    )
    .expect("resolve");

    let settings = config.non_default_settings();
    assert!(settings.contains(&("name", "gpu-box".to_string())));
    assert!(settings.contains(&("shared secret", "********".to_string())));
    assert!(settings.contains(&("flash attention", "disabled".to_string())));
    assert!(settings.iter().all(|(_, v)| !v.contains("hunter2")));
    assert_eq!(config.connection().shared_secret.as_deref(), Some("hunter2"));
}

#[rstest]
#[case(true, true)]
#[case(false, false)]
fn no_tls_requires_confirmation(#[case] answer: bool, #[case] accepted: bool) {
    let prompt = Replay::new(answer, &[]);
    let result = InstallConfig::resolve(
        InstallOptions {
            model_path: Some(PathBuf::from("/models")),
            no_tls: true,
            ..InstallOptions::default()
        },
        &sources(None, PathBuf::from("/nonexistent")),
        &prompt,
    );

    match result {
        Ok(config) => {
            assert!(accepted);
            assert!(!config.tls);
            assert!(!config.connection().use_tls);
        }
        Err(err) => {
            assert!(!accepted);
            assert!(matches!(err, ConfigError::Cancelled));
        }
    }
    assert!(prompt.notes.borrow()[0].contains("--no-tls"));
}

#[test]
fn quiet_no_tls_skips_the_warning() {
    let prompt = Replay::new(false, &[]);
    let config = InstallConfig::resolve(
        InstallOptions {
            model_path: Some(PathBuf::from("/models")),
            no_tls: true,
            ..quiet()
        },
        &sources(None, PathBuf::from("/nonexistent")),
        &prompt,
    )
    .expect("resolve");

    assert!(!config.tls);
    assert!(prompt.notes.borrow().is_empty());
}

// ---------------------------------------------------------------------------
// --join
// ---------------------------------------------------------------------------

#[rstest]
#[case("not json")]
#[case(r#"{"host": "proxy.local"}"#)]
#[case(r#"{"host": "proxy.local", "port": 0}"#)]
#[case(r#"{"host": "proxy.local", "port": 7859, "servers": [{"port": 7859}]}"#)]
fn invalid_join_is_rejected_before_anything_else(#[case] join: &str) {
    let err = InstallConfig::resolve(
        InstallOptions {
            join: Some(join.to_string()),
            ..quiet()
        },
        &sources(None, PathBuf::from("/nonexistent")),
        &TerminalPrompt::new(true),
    )
    .expect_err("invalid join");

    assert!(matches!(err, ConfigError::InvalidJoin(_)));
}

#[test]
fn valid_join_is_kept_verbatim() {
    let text = r#"{"host":"proxy.local","port":7859,"servers":[{"address":"gpu1.local","port":7860,"priority":2}]}"#;
    let config = InstallConfig::resolve(
        InstallOptions {
            model_path: Some(PathBuf::from("/models")),
            join: Some(text.to_string()),
            ..quiet()
        },
        &sources(None, PathBuf::from("/nonexistent")),
        &TerminalPrompt::new(true),
    )
    .expect("resolve");

    let join = config.join.expect("join");
    assert_eq!(join.as_str(), text);
    assert_eq!(join.servers[0].priority, Some(2));
}

#[test]
fn join_errors_name_the_problem() {
    let err = dts_installer::JoinConfig::parse(r#"{"host": "", "port": 7859}"#).unwrap_err();
    assert!(matches!(err, JoinError::EmptyHost));
}
