pub mod group;
pub mod principal;

pub use group::Entity as GroupRow;
pub use principal::Entity as PrincipalRow;
