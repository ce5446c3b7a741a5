pub mod category;
pub mod event;
pub mod profile;
pub mod registration;
pub mod summary;

pub use category::Category;
pub use event::{Event, EventPatch, EventStatus, EventWithOrganizer, NewEvent};
pub use profile::{Credential, Profile, ProfilePatch, Role};
pub use registration::{
    PaymentStatus, Registration, RegistrationCheck, RegistrationStatus, RegistrationWithEvent,
    RegistrationWithUser,
};
pub use summary::{EventStats, OrganizerSummary};
