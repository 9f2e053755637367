pub mod athlete;
pub mod database;
pub mod events;
pub mod fop;
pub mod records;
pub mod scoring;
pub mod session;
pub mod store;
pub mod translations;

pub use athlete::{Athlete, AthleteKey, AttemptCell, AttemptFields, AttemptStatus, Gender};
pub use database::{
    AgeGroup, CompetitionInfo, DatabaseFormat, DatabaseState, Official, OfficialRole, Team,
};
pub use events::{HubEvent, HubEventKind};
pub use fop::{
    DecisionState, FopUpdate, OrderEntry, RowClass, SessionAthlete, TimerState, TimerView,
};
pub use records::{RecordEntry, RecordKind};
pub use session::SessionPhase;
pub use store::{CompetitionHub, FopSnapshot, HubError, LiveOverlay, SharedHub};
pub use translations::TranslationStore;
