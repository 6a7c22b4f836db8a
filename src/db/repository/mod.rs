pub mod discount;
pub mod discount_code;
pub mod event;
pub mod organizer;
pub mod ticket_type;

pub use discount::DiscountRepository;
pub use discount_code::{DiscountCodeRepository, MemberDiscountCodeRepository};
pub use event::EventRepository;
pub use organizer::OrganizerRepository;
pub use ticket_type::TicketTypeRepository;
