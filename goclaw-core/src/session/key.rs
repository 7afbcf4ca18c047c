//! Session key derivation.
//!
//! Keys carry a three-segment agent prefix `agent:<agentId>:`. Group messages produce
//! `agent:<id>:<channel>:[<account>:]group:<chatId>`; direct messages collapse to the
//! agent's fixed main key; a global scope produces the literal `global`.

/// What a session key is being derived for.
#[derive(Clone, Debug)]
pub enum SessionScope {
    /// A group chat on a channel, optionally with a sub-account.
    Group {
        channel: String,
        account_id: Option<String>,
        chat_id: String,
    },
    /// A direct (1:1) message; collapses to the agent's fixed main key.
    Direct,
    /// Cross-agent global scope: the literal key `global`.
    Global,
}

/// Derives the canonical session key for `agent_id` and `scope`. When `thread_id` is
/// `Some`, `:thread:<id>` is appended.
pub fn session_key(agent_id: &str, scope: &SessionScope, thread_id: Option<&str>) -> String {
    let base = match scope {
        SessionScope::Global => return "global".to_string(),
        SessionScope::Direct => format!("agent:{agent_id}:main"),
        SessionScope::Group {
            channel,
            account_id,
            chat_id,
        } => match account_id {
            Some(account) => format!("agent:{agent_id}:{channel}:{account}:group:{chat_id}"),
            None => format!("agent:{agent_id}:{channel}:group:{chat_id}"),
        },
    };
    match thread_id {
        Some(id) if !id.is_empty() => format!("{base}:thread:{id}"),
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_scope_is_literal() {
        assert_eq!(session_key("a1", &SessionScope::Global, None), "global");
    }

    #[test]
    fn direct_scope_collapses_to_main_key() {
        assert_eq!(session_key("a1", &SessionScope::Direct, None), "agent:a1:main");
    }

    #[test]
    fn group_scope_without_account() {
        let scope = SessionScope::Group {
            channel: "telegram".into(),
            account_id: None,
            chat_id: "42".into(),
        };
        assert_eq!(session_key("a1", &scope, None), "agent:a1:telegram:group:42");
    }

    #[test]
    fn group_scope_with_account() {
        let scope = SessionScope::Group {
            channel: "telegram".into(),
            account_id: Some("acct1".into()),
            chat_id: "42".into(),
        };
        assert_eq!(
            session_key("a1", &scope, None),
            "agent:a1:telegram:acct1:group:42"
        );
    }

    #[test]
    fn thread_suffix_is_appended_when_present() {
        let scope = SessionScope::Direct;
        assert_eq!(
            session_key("a1", &scope, Some("t1")),
            "agent:a1:main:thread:t1"
        );
    }

    #[test]
    fn empty_thread_id_is_treated_as_absent() {
        assert_eq!(session_key("a1", &SessionScope::Direct, Some("")), "agent:a1:main");
    }
}
