//! 身份注册握手状态机
//!
//! 注册流程以会话 id 为键，状态显式保存在表中：
//!
//! ```text
//! AwaitingPhone ──phone──▶ AwaitingCode ──code ok──────────────▶ Completed
//!                               │                                   ▲
//!                               └──password required──▶ AwaitingPassword
//!           (任意状态) ──rejected / cancel──▶ Failed
//! ```
//!
//! 验证码与密码的校验由外部完成，这里只记录结果并在完成后写入凭据存储。
//! 失败或取消的会话立即从表中移除，表中只剩进行中与待写入的会话。

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use contracts::{ContractError, CredentialStore, Registration};

/// 注册会话 id (例如管理员的聊天 id)
pub type SessionId = u64;

/// 会话状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentState {
    AwaitingPhone,
    AwaitingCode { phone: String },
    AwaitingPassword { phone: String },
    Completed { phone: String },
    Failed { reason: String },
}

impl EnrollmentState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AwaitingPhone => "awaiting_phone",
            Self::AwaitingCode { .. } => "awaiting_code",
            Self::AwaitingPassword { .. } => "awaiting_password",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// 外部校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Accepted,
    /// 账号开启了两步验证
    PasswordRequired,
    Rejected(String),
}

/// 注册错误
#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("no enrollment in progress for session {0}")]
    UnknownSession(SessionId),

    #[error("session {0} already has an enrollment in progress")]
    AlreadyInProgress(SessionId),

    #[error("session {session} is {state}, cannot accept {input}")]
    UnexpectedInput {
        session: SessionId,
        state: &'static str,
        input: &'static str,
    },

    #[error("phone number cannot be empty")]
    EmptyPhone,

    #[error("credential store error: {0}")]
    Store(#[from] ContractError),
}

/// 注册状态表
#[derive(Debug, Default)]
pub struct EnrollmentTable {
    sessions: Mutex<HashMap<SessionId, EnrollmentState>>,
}

impl EnrollmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始新的注册；已完成但未写入凭据的旧会话会被覆盖
    pub fn begin(&self, session: SessionId) -> Result<(), EnrollmentError> {
        let mut sessions = self.sessions.lock();
        if let Some(state) = sessions.get(&session) {
            if !state.is_finished() {
                return Err(EnrollmentError::AlreadyInProgress(session));
            }
        }
        sessions.insert(session, EnrollmentState::AwaitingPhone);
        Ok(())
    }

    pub fn state(&self, session: SessionId) -> Option<EnrollmentState> {
        self.sessions.lock().get(&session).cloned()
    }

    /// 表中保存的会话数 (进行中 + 已完成待写入)
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn in_progress(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|s| !s.is_finished())
            .count()
    }

    /// AwaitingPhone → AwaitingCode
    pub fn submit_phone(
        &self,
        session: SessionId,
        phone: &str,
    ) -> Result<EnrollmentState, EnrollmentError> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(EnrollmentError::EmptyPhone);
        }
        self.advance(session, "phone", |state| match state {
            EnrollmentState::AwaitingPhone => Some(EnrollmentState::AwaitingCode {
                phone: phone.to_string(),
            }),
            _ => None,
        })
    }

    /// AwaitingCode → Completed | AwaitingPassword | Failed
    pub fn submit_code(
        &self,
        session: SessionId,
        verification: Verification,
    ) -> Result<EnrollmentState, EnrollmentError> {
        self.advance(session, "code", |state| match state {
            EnrollmentState::AwaitingCode { phone } => Some(match verification {
                Verification::Accepted => EnrollmentState::Completed {
                    phone: phone.clone(),
                },
                Verification::PasswordRequired => EnrollmentState::AwaitingPassword {
                    phone: phone.clone(),
                },
                Verification::Rejected(reason) => EnrollmentState::Failed { reason },
            }),
            _ => None,
        })
    }

    /// AwaitingPassword → Completed | Failed
    pub fn submit_password(
        &self,
        session: SessionId,
        verification: Verification,
    ) -> Result<EnrollmentState, EnrollmentError> {
        self.advance(session, "password", |state| match state {
            EnrollmentState::AwaitingPassword { phone } => Some(match verification {
                Verification::Accepted => EnrollmentState::Completed {
                    phone: phone.clone(),
                },
                Verification::PasswordRequired => EnrollmentState::Failed {
                    reason: "password rejected".to_string(),
                },
                Verification::Rejected(reason) => EnrollmentState::Failed { reason },
            }),
            _ => None,
        })
    }

    /// 放弃并移除会话
    pub fn cancel(&self, session: SessionId) -> Result<(), EnrollmentError> {
        match self.sessions.lock().remove(&session) {
            Some(state) => {
                info!(session, state = state.name(), "Enrollment cancelled");
                Ok(())
            }
            None => Err(EnrollmentError::UnknownSession(session)),
        }
    }

    /// 已完成的会话写入凭据存储 (按手机号去重)，并移除会话
    pub async fn register<S: CredentialStore>(
        &self,
        session: SessionId,
        credential: &str,
        store: &S,
    ) -> Result<Registration, EnrollmentError> {
        let phone = match self.state(session) {
            Some(EnrollmentState::Completed { phone }) => phone,
            Some(other) => {
                return Err(EnrollmentError::UnexpectedInput {
                    session,
                    state: other.name(),
                    input: "credential",
                });
            }
            None => return Err(EnrollmentError::UnknownSession(session)),
        };

        let registration = store.register_identity(&phone, credential).await?;
        self.sessions.lock().remove(&session);

        match registration {
            Registration::Created(id) => info!(identity = %id, phone = %phone, "Identity registered"),
            Registration::AlreadyExists(id) => {
                warn!(identity = %id, phone = %phone, "Identity already registered")
            }
        }
        Ok(registration)
    }

    /// 执行一步转换；进入 Failed 的会话直接移除，失败原因只通过返回值给出
    fn advance(
        &self,
        session: SessionId,
        input: &'static str,
        step: impl FnOnce(&EnrollmentState) -> Option<EnrollmentState>,
    ) -> Result<EnrollmentState, EnrollmentError> {
        let mut sessions = self.sessions.lock();
        let state = sessions
            .get_mut(&session)
            .ok_or(EnrollmentError::UnknownSession(session))?;
        let next = step(state).ok_or(EnrollmentError::UnexpectedInput {
            session,
            state: state.name(),
            input,
        })?;
        if let EnrollmentState::Failed { reason } = &next {
            warn!(session, input, reason = %reason, "Enrollment failed");
            sessions.remove(&session);
        } else {
            *state = next.clone();
        }
        Ok(next)
    }
}
