pub mod owner;
pub mod payment;
pub mod pet;
pub mod user;
pub mod veterinarian;
pub mod visit;
