use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::CommitConfig;
use crate::error::{ChatError, StoreError};
use crate::llm::{GenerationRequest, Generator};
use crate::session::{Session, SessionStore, SessionVersion, Turn};

/// What happened to the updated session after generation succeeded
#[derive(Debug, Clone)]
pub enum Persistence {
    /// Written to the store at `version`
    Saved {
        version: SessionVersion,
        attempts: u32,
    },
    /// Not written; the reply is still delivered
    Failed(StoreError),
}

impl Persistence {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Result of advancing a session by one exchange
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub agent_text: String,
    /// The session with the new user/agent pair appended
    pub session: Session,
    pub persistence: Persistence,
}

/// Runs one exchange: generate a reply, append the pair, commit.
pub struct TurnOrchestrator {
    generator: Arc<dyn Generator>,
    store: Arc<dyn SessionStore>,
    system_instruction: String,
    commit: CommitConfig,
}

impl TurnOrchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        store: Arc<dyn SessionStore>,
        system_instruction: impl Into<String>,
        commit: CommitConfig,
    ) -> Self {
        Self {
            generator,
            store,
            system_instruction: system_instruction.into(),
            commit,
        }
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    fn build_request(&self, session: &Session, user_text: &str) -> GenerationRequest {
        GenerationRequest {
            system: self.system_instruction.clone(),
            history: session.state.turns().to_vec(),
            prompt: user_text.to_string(),
        }
    }

    /// Advance `session` by one exchange.
    ///
    /// A generation failure returns an error and leaves nothing appended or
    /// saved. A commit failure is reported in [`TurnOutcome::persistence`]
    /// and never turns into an error.
    pub async fn advance(
        &self,
        mut session: Session,
        user_text: &str,
    ) -> Result<TurnOutcome, ChatError> {
        let request = self.build_request(&session, user_text);

        debug!(
            session_id = %session.id,
            history = request.history.len(),
            generator = self.generator.name(),
            "generating reply"
        );

        let agent_text = match self.generator.generate(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "generation failed, session unchanged");
                return Err(e.into());
            }
        };

        let pair = [Turn::user(user_text), Turn::agent(agent_text.clone())];
        for turn in &pair {
            session.state.push_turn(turn.clone());
        }

        let persistence = self.commit(&mut session, &pair).await;
        if let Persistence::Saved { attempts, .. } = &persistence {
            info!(
                session_id = %session.id,
                turns = session.state.turns().len(),
                attempts,
                "session saved"
            );
        }

        Ok(TurnOutcome {
            agent_text,
            session,
            persistence,
        })
    }

    async fn commit(&self, session: &mut Session, pair: &[Turn; 2]) -> Persistence {
        if !self.commit.optimistic {
            return match self.store.save(&session.id, &session.state).await {
                Ok(version) => {
                    session.version = Some(version.clone());
                    Persistence::Saved {
                        version,
                        attempts: 1,
                    }
                }
                Err(e) => {
                    error!(session_id = %session.id, error = %e, "failed to save session");
                    Persistence::Failed(e)
                }
            };
        }

        let mut attempts = 1;
        loop {
            let result = self
                .store
                .save_if(&session.id, &session.state, session.version.as_ref())
                .await;

            match result {
                Ok(version) => {
                    session.version = Some(version.clone());
                    return Persistence::Saved { version, attempts };
                }
                Err(e) if e.is_conflict() && attempts < self.commit.max_attempts => {
                    warn!(session_id = %session.id, attempts, "stale session write, merging with latest");
                    if let Err(read_err) = self.rebase(session, pair).await {
                        error!(session_id = %session.id, error = %read_err, "failed to reload session for merge");
                        return Persistence::Failed(read_err);
                    }
                    attempts += 1;
                }
                Err(e) => {
                    error!(session_id = %session.id, attempts, error = %e, "failed to save session");
                    return Persistence::Failed(e);
                }
            }
        }
    }

    /// Replace `session` with the latest stored state plus this exchange's pair
    async fn rebase(&self, session: &mut Session, pair: &[Turn; 2]) -> Result<(), StoreError> {
        match self.store.get(&session.id).await? {
            Some(latest) => {
                let mut state = latest.state;
                for turn in pair {
                    state.push_turn(turn.clone());
                }
                session.state = state;
                session.version = Some(latest.version);
            }
            None => {
                // Record vanished between read and write; recreate it from ours
                session.version = None;
            }
        }
        Ok(())
    }
}
