//! Domain layer: parties, rosters, final statements and attendee tokens.

pub mod party;
pub mod roster;
pub mod statement;
pub mod status;
pub mod token;

pub use party::{PopDesc, ShortDesc};
pub use roster::{Roster, ServerIdentity};
pub use statement::{intersect_attendees, union_attendees, FinalStatement, MergeMeta};
pub use status::PopStatus;
pub use token::{verify_token, PopToken};
