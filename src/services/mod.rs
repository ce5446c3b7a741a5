pub mod dashboard;
pub mod events;
pub mod registrations;

pub use dashboard::DashboardService;
pub use events::EventService;
pub use registrations::RegistrationService;
