pub mod email;
pub mod ratings;
pub mod tour_service;

pub use email::{Email, Mailer, SharedMailer};
pub use tour_service::TourService;
