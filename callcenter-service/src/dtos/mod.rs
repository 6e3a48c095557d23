pub mod sessions;
pub mod system;

pub use sessions::{
    ChatRequest, ChatResponse, CreatePremiumSessionRequest, CreateSessionRequest,
    CreateSessionResponse, DeleteSessionResponse, PremiumChatResponse,
    PremiumSessionResponse, SessionDetailResponse, SessionListResponse,
};
pub use system::{HealthResponse, StatsResponse};
