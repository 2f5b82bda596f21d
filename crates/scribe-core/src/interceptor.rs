//! Commit detection for an audited transaction.

/// Whether staged work is waiting for the transaction to commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InterceptorState {
    #[default]
    Idle,
    Armed,
}

/// What to do with a statement about to be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementVerdict {
    PassThrough,
    /// The statement commits; flush staged records before sending it.
    Flush,
}

/// Two-state machine watching statements of one transaction.
///
/// Armed by the first staged operation. Seeing a commit statement while armed
/// returns to idle before the flush runs, so the flush's own statements pass
/// through untouched.
#[derive(Debug, Default, Clone)]
pub struct CommitInterceptor {
    state: InterceptorState,
}

impl CommitInterceptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm for the current transaction. Returns `false` if already armed.
    pub const fn arm(&mut self) -> bool {
        let was_idle = matches!(self.state, InterceptorState::Idle);
        self.state = InterceptorState::Armed;
        was_idle
    }

    pub const fn disarm(&mut self) {
        self.state = InterceptorState::Idle;
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        matches!(self.state, InterceptorState::Armed)
    }

    #[must_use]
    pub const fn state(&self) -> InterceptorState {
        self.state
    }

    /// Inspect a statement. A commit while armed disarms and asks for a flush.
    pub fn observe_statement(&mut self, sql: &str) -> StatementVerdict {
        if self.is_armed() && is_commit_statement(sql) {
            self.disarm();
            tracing::trace!("commit intercepted");
            StatementVerdict::Flush
        } else {
            StatementVerdict::PassThrough
        }
    }
}

/// Whether `sql` ends the transaction by committing it.
///
/// Accepts `COMMIT`, `END`, either followed by `TRANSACTION`, in any case,
/// optionally quoted, with trailing semicolons.
#[must_use]
pub fn is_commit_statement(sql: &str) -> bool {
    matches!(
        normalize(sql).as_str(),
        "commit" | "end" | "commit transaction" | "end transaction"
    )
}

/// Whether `sql` opens, ends, or nests a transaction.
///
/// Matches on the leading keyword, so `ROLLBACK TO sp` and
/// `BEGIN IMMEDIATE` count as well.
#[must_use]
pub fn is_transaction_control(sql: &str) -> bool {
    let normalized = normalize(sql);
    let keyword = normalized.split(' ').next().unwrap_or_default();
    matches!(
        keyword,
        "begin" | "commit" | "end" | "rollback" | "savepoint" | "release"
    )
}

fn normalize(sql: &str) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| trimmed.strip_prefix(*q).and_then(|s| s.strip_suffix(*q)))
        .unwrap_or(trimmed);
    unquoted
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}
