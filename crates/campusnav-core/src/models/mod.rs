//! Data models for campus entities.
//!
//! - `Record<T>`: a remote document decoded into `T` plus its remote id
//! - `Alert`, `Incident`, `CampusEvent`, `PresenceEntry`, `UserProfile`:
//!   the mirrored remote collections
//! - `Building`, `GeofenceZone`, `Coordinates`: static campus geometry

pub mod alert;
pub mod building;
pub mod event;
pub mod incident;
pub mod presence;
pub mod record;
pub mod user;

pub use alert::{Alert, AlertKind, NewAlert};
pub use building::{Building, Coordinates, GeofenceZone};
pub use event::{CampusEvent, NewCampusEvent};
pub use incident::{Incident, IncidentStatus, NewIncident};
pub use presence::PresenceEntry;
pub use record::{CollectionRecord, Record};
pub use user::{Role, UserProfile};
