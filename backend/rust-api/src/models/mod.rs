pub mod achievement;
pub mod hunt;
pub mod session;
pub mod timer;

pub use achievement::{
    AchievementDefinition, AchievementGrant, Rarity, TriggerEvent, UserAchievementsResponse,
    UserHistory,
};
pub use hunt::{Clue, ClueType, CreateHuntRequest, Hunt, HuntStatus, HuntSummary, HuntView};
pub use session::{
    CompletedClue, HuntSession, JoinHuntRequest, JoinHuntResponse, SessionSnapshot,
    SessionStatus, SessionView, SubmitClueRequest, SubmitClueResponse, UseHintResponse,
};
