use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::host_contract::{
    AgentEventHooks, HostLogger, MessageContext, MessageReceivedEvent, MessageSendingEvent,
    ToolCallContext, ToolCallEvent, TracingHostLogger,
};
use crate::rbac_plugin::{policy_summary_json, RbacPlugin, FAIL_SAFE_DENY_REASON};

#[derive(Default)]
struct RecordingLogger {
    lines: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingLogger {
    fn record(&self, level: &'static str, line: &str) {
        self.lines
            .lock()
            .expect("logger lock")
            .push((level, line.to_string()));
    }

    fn rendered(&self) -> Vec<String> {
        self.lines
            .lock()
            .expect("logger lock")
            .iter()
            .map(|(level, line)| format!("{level} {line}"))
            .collect()
    }

    fn count_containing(&self, needle: &str) -> usize {
        self.rendered()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }
}

impl HostLogger for RecordingLogger {
    fn info(&self, line: &str) {
        self.record("info", line);
    }

    fn warn(&self, line: &str) {
        self.record("warn", line);
    }

    fn error(&self, line: &str) {
        self.record("error", line);
    }
}

fn scenario_policy_document() -> Value {
    json!({
        "roles": {
            "admin": { "users": ["408001372", "447903128"], "tools": "*" },
            "guest-telegram": {
                "users": "*",
                "tools": ["get_recent_news", "subscribe_user", "unsubscribe_user"],
                "channels": ["telegram"]
            },
            "guest-max": {
                "users": "*",
                "tools": ["get_recent_news", "memory_search"],
                "channels": ["max"]
            },
            "guest": { "users": "*", "tools": ["get_recent_news"] }
        },
        "failSafe": "deny"
    })
}

fn scenario_policy_with_commands() -> Value {
    let mut document = scenario_policy_document();
    document["systemCommands"] = json!({
        "mode": "allowlist",
        "allowed": ["/start", "/stop", "/news"],
        "guestHelp": "You can use /start, /stop and /news.",
        "blockResponse": "That command is reserved for administrators."
    });
    document
}

fn register_plugin(document: &Value) -> (RbacPlugin, Arc<RecordingLogger>) {
    let logger = Arc::new(RecordingLogger::default());
    let plugin =
        RbacPlugin::register(document, logger.clone()).expect("register");
    (plugin, logger)
}

fn tool_call(plugin: &RbacPlugin, tool_name: &str, session_key: Option<&str>) -> Option<String> {
    plugin
        .before_tool_call(
            &ToolCallEvent {
                tool_name: tool_name.to_string(),
            },
            &ToolCallContext {
                session_key: session_key.map(str::to_string),
            },
        )
        .map(|verdict| {
            assert!(verdict.block);
            verdict.block_reason
        })
}

#[test]
fn unit_before_tool_call_skips_internal_calls_without_session_key() {
    let (plugin, logger) = register_plugin(&scenario_policy_document());
    assert_eq!(tool_call(&plugin, "exec", None), None);
    assert_eq!(logger.count_containing("BLOCKED"), 0);
}

#[test]
fn integration_admin_session_allows_privileged_tool() {
    let (plugin, _logger) = register_plugin(&scenario_policy_document());
    assert_eq!(
        tool_call(&plugin, "exec", Some("agent:main:telegram:direct:408001372")),
        None
    );
}

#[test]
fn integration_channel_scoped_guest_is_blocked_outside_its_channel() {
    let (plugin, _logger) = register_plugin(&scenario_policy_document());

    let reason = tool_call(
        &plugin,
        "memory_search",
        Some("agent:main:telegram:direct:999111222"),
    )
    .expect("telegram guest lacks memory_search");
    assert!(reason.contains("guest-telegram"));
    assert!(reason.contains("memory_search"));

    assert_eq!(
        tool_call(
            &plugin,
            "memory_search",
            Some("agent:main:max:direct:999111222")
        ),
        None,
        "the max channel role carries memory_search"
    );
}

#[test]
fn integration_unlisted_channel_falls_back_to_generic_guest() {
    let (plugin, _logger) = register_plugin(&scenario_policy_document());
    let reason = tool_call(
        &plugin,
        "subscribe_user",
        Some("agent:main:web:direct:555666777"),
    )
    .expect("generic guest lacks subscribe_user");
    assert!(reason.contains("\"guest\""));
}

#[test]
fn integration_unparseable_session_key_is_blocked_under_fail_safe_deny() {
    let (plugin, logger) = register_plugin(&scenario_policy_document());
    let reason =
        tool_call(&plugin, "exec", Some("agent:main:main")).expect("main scope is not a peer");
    assert_eq!(reason, FAIL_SAFE_DENY_REASON);
    assert_eq!(logger.count_containing("BLOCKED"), 1);
}

#[test]
fn functional_unparseable_session_key_passes_under_fail_safe_allow() {
    let mut document = scenario_policy_document();
    document["failSafe"] = json!("allow");
    let (plugin, logger) = register_plugin(&document);
    assert_eq!(tool_call(&plugin, "exec", Some("agent:main:main")), None);
    assert_eq!(logger.count_containing("BLOCKED"), 0);
}

#[test]
fn integration_blocked_command_reply_is_substituted_for_guests() {
    let (plugin, logger) = register_plugin(&scenario_policy_with_commands());

    plugin.message_received(
        &MessageReceivedEvent {
            content: "/status".to_string(),
            from: "999111222".to_string(),
        },
        &MessageContext {
            channel_id: Some("telegram".to_string()),
        },
    );
    assert_eq!(logger.count_containing("GUARD command=\"/status\""), 1);

    let replaced = plugin
        .message_sending(&MessageSendingEvent {
            content: "status: 4 sessions active".to_string(),
        })
        .expect("pending block must rewrite the reply");
    assert_eq!(
        replaced.content,
        "That command is reserved for administrators."
    );

    // The slot is consumed; the next outgoing message is untouched.
    assert!(plugin
        .message_sending(&MessageSendingEvent {
            content: "follow-up".to_string(),
        })
        .is_none());
}

#[test]
fn integration_help_command_reply_uses_guest_help_text() {
    let (plugin, _logger) = register_plugin(&scenario_policy_with_commands());

    plugin.message_received(
        &MessageReceivedEvent {
            content: "/help".to_string(),
            from: "999111222".to_string(),
        },
        &MessageContext {
            channel_id: Some("telegram".to_string()),
        },
    );
    let replaced = plugin
        .message_sending(&MessageSendingEvent {
            content: "host help output".to_string(),
        })
        .expect("guest help must replace the host /help output");
    assert_eq!(replaced.content, "You can use /start, /stop and /news.");
}

#[test]
fn integration_admin_commands_are_never_intercepted() {
    let (plugin, logger) = register_plugin(&scenario_policy_with_commands());

    plugin.message_received(
        &MessageReceivedEvent {
            content: "/status".to_string(),
            from: "408001372".to_string(),
        },
        &MessageContext {
            channel_id: Some("telegram".to_string()),
        },
    );
    assert_eq!(logger.count_containing("GUARD"), 0);
    assert!(plugin
        .message_sending(&MessageSendingEvent {
            content: "status: 4 sessions active".to_string(),
        })
        .is_none());
}

#[test]
fn functional_allowlisted_commands_pass_through_untouched() {
    let (plugin, logger) = register_plugin(&scenario_policy_with_commands());
    plugin.message_received(
        &MessageReceivedEvent {
            content: "/start".to_string(),
            from: "999111222".to_string(),
        },
        &MessageContext {
            channel_id: Some("telegram".to_string()),
        },
    );
    assert_eq!(logger.count_containing("GUARD"), 0);
    assert!(plugin
        .message_sending(&MessageSendingEvent {
            content: "started".to_string(),
        })
        .is_none());
}

#[test]
fn functional_blocked_audit_lines_are_rate_limited_with_single_notice() {
    let mut document = scenario_policy_document();
    document["rateLimit"] = json!({ "maxBlockedPerMinute": 1 });
    let (plugin, logger) = register_plugin(&document);

    for _ in 0..3 {
        let reason = tool_call(
            &plugin,
            "memory_search",
            Some("agent:main:telegram:direct:999111222"),
        )
        .expect("blocked every time");
        assert!(reason.contains("memory_search"));
    }

    assert_eq!(logger.count_containing("BLOCKED tool=\"memory_search\""), 1);
    assert_eq!(logger.count_containing("rate limit exceeded"), 1);
}

#[test]
fn functional_allowed_calls_log_only_when_enabled() {
    let mut document = scenario_policy_document();
    document["logAllowed"] = json!(true);
    let (plugin, logger) = register_plugin(&document);
    assert_eq!(
        tool_call(&plugin, "exec", Some("agent:main:telegram:direct:408001372")),
        None
    );
    assert_eq!(
        logger.count_containing("ALLOWED tool=\"exec\""),
        1,
        "allowed line carries the resolved role"
    );
    assert_eq!(logger.count_containing("role=\"admin\""), 1);

    let (quiet_plugin, quiet_logger) = register_plugin(&scenario_policy_document());
    assert_eq!(
        tool_call(
            &quiet_plugin,
            "exec",
            Some("agent:main:telegram:direct:408001372")
        ),
        None
    );
    assert_eq!(quiet_logger.count_containing("ALLOWED"), 0);
}

#[test]
fn functional_log_blocked_false_silences_audit_but_still_blocks() {
    let mut document = scenario_policy_document();
    document["logBlocked"] = json!(false);
    let (plugin, logger) = register_plugin(&document);
    assert!(tool_call(
        &plugin,
        "memory_search",
        Some("agent:main:telegram:direct:999111222")
    )
    .is_some());
    assert_eq!(logger.count_containing("BLOCKED"), 0);
}

#[test]
fn regression_invalid_policy_aborts_registration_with_logged_error() {
    let logger = Arc::new(RecordingLogger::default());
    let error = RbacPlugin::register(
        &json!({ "roles": {} }),
        logger.clone(),
    )
    .expect_err("empty roles must abort registration");
    assert!(error.to_string().contains("registration"));
    assert_eq!(logger.count_containing("rbac: invalid policy"), 1);
}

#[test]
fn functional_registration_logs_summary_and_warnings() {
    let mut document = scenario_policy_document();
    document["roles"]["guest"]["tools"] = json!([]);
    let (_plugin, logger) = register_plugin(&document);
    assert_eq!(
        logger.count_containing("registered roles=4 defaultRole=\"guest\" failSafe=\"deny\""),
        1
    );
    assert_eq!(logger.count_containing("policy warning"), 1);
}

#[test]
fn functional_reload_swaps_policy_and_keeps_last_good_on_failure() {
    let (plugin, logger) = register_plugin(&scenario_policy_document());
    assert_eq!(plugin.policy().roles.len(), 4);

    plugin
        .reload_from_value(&json!({
            "roles": {
                "guest": { "users": "*", "tools": "*" }
            }
        }))
        .expect("valid reload");
    assert_eq!(plugin.policy().roles.len(), 1);
    assert_eq!(logger.count_containing("reloaded roles=1"), 1);

    let error = plugin
        .reload_from_value(&json!({ "roles": {} }))
        .expect_err("invalid reload must fail");
    assert!(error.to_string().contains("reload"));
    assert_eq!(plugin.policy().roles.len(), 1, "last-good policy survives");
    assert_eq!(logger.count_containing("reload rejected"), 1);
}

#[test]
fn integration_register_from_file_round_trips_policy_document() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("rbac-policy.json");
    std::fs::write(
        &path,
        serde_json::to_string_pretty(&scenario_policy_document()).expect("render policy"),
    )
    .expect("write policy");

    let logger = Arc::new(RecordingLogger::default());
    let plugin = RbacPlugin::register_from_file(&path, logger.clone())
        .expect("register from file");
    assert_eq!(plugin.policy().roles.len(), 4);

    let missing = temp.path().join("missing.json");
    let error = RbacPlugin::register_from_file(&missing, logger.clone())
        .expect_err("missing policy file must abort registration");
    assert!(error.to_string().contains("missing.json"));
    assert_eq!(logger.count_containing("rbac: invalid policy"), 1);
}

#[test]
fn unit_policy_summary_json_reports_active_configuration() {
    let (plugin, _logger) = register_plugin(&scenario_policy_with_commands());
    let summary = policy_summary_json(&plugin.policy());
    assert_eq!(summary["role_count"], 4);
    assert_eq!(summary["default_role"], "guest");
    assert_eq!(summary["fail_safe"], "deny");
    assert_eq!(summary["log_blocked"], true);
    assert_eq!(summary["system_commands_mode"], "allowlist");
    assert_eq!(
        summary["roles"],
        json!(["admin", "guest-telegram", "guest-max", "guest"])
    );
}

#[test]
fn regression_tracing_host_logger_writes_through_tracing_facade() {
    use std::io::{self, Write};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct SharedLogBuffer {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    struct SharedLogWriter {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    impl<'a> MakeWriter<'a> for SharedLogBuffer {
        type Writer = SharedLogWriter;

        fn make_writer(&'a self) -> Self::Writer {
            SharedLogWriter {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl Write for SharedLogWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut locked = self.inner.lock().expect("log buffer lock");
            locked.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let logs = SharedLogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .with_writer(logs.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let logger = TracingHostLogger;
        logger.warn("rbac: BLOCKED tool=\"exec\" peer=\"1\" channel=\"\" role=\"guest\" reason=\"denied\"");
    });

    let rendered = String::from_utf8(logs.inner.lock().expect("log buffer lock").clone())
        .expect("valid utf8 logs");
    assert!(rendered.contains("rbac: BLOCKED tool=\"exec\""));
    assert!(rendered.contains("WARN"));
}
