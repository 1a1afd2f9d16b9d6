use std::fmt;

/// Where one service is in the build.
///
/// ```text
/// Pending → Loaded → Initialized → Compiled ─┬─────────────────────────┬→ IssuesChecked → Built → Done
///                                            └→ Assumed → Recompiled ──┘
/// ```
///
/// `Failed` is reachable from every state except `Done` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Pending,
    Loaded,
    Initialized,
    Compiled,
    Assumed,
    Recompiled,
    IssuesChecked,
    Built,
    Done,
    Failed,
}

impl LifecycleState {
    pub fn is_final(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (from, Failed) => !from.is_final(),
            (Pending, Loaded)
            | (Loaded, Initialized)
            | (Initialized, Compiled)
            | (Compiled, Assumed)
            | (Assumed, Recompiled)
            | (Compiled | Recompiled, IssuesChecked)
            | (IssuesChecked, Built)
            | (Built, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Loaded => "loaded",
            Self::Initialized => "initialized",
            Self::Compiled => "compiled",
            Self::Assumed => "assumed",
            Self::Recompiled => "recompiled",
            Self::IssuesChecked => "issues-checked",
            Self::Built => "built",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("service '{service}' cannot move from {from} to {to}")]
pub struct TransitionError {
    pub service: String,
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// State and transition history of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRun {
    pub service: String,
    state: LifecycleState,
    history: Vec<LifecycleState>,
}

impl ServiceRun {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            state: LifecycleState::Pending,
            history: vec![LifecycleState::Pending],
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    pub fn advance(&mut self, next: LifecycleState) -> Result<(), TransitionError> {
        if !self.state.can_advance_to(next) {
            return Err(TransitionError {
                service: self.service.clone(),
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(service = %self.service, from = %self.state, to = %next, "Lifecycle transition");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Mark as failed; a no-op once the run is final.
    pub fn fail(&mut self) {
        if !self.state.is_final() {
            self.state = LifecycleState::Failed;
            self.history.push(LifecycleState::Failed);
        }
    }
}
