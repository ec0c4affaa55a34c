//! Tenant, role and plan resolution

pub mod ai;
pub mod calendar;
pub mod capability;
pub mod clinics;
pub mod invitation;
pub mod resolver;

pub use ai::AiCredentialService;
pub use calendar::{CalendarOAuth, CalendarState};
pub use capability::{
    clinic_limit, plan_supports_capability, staff_seat_limit, Capability, CapabilityGate,
};
pub use clinics::ClinicService;
pub use invitation::{AcceptInvitation, AcceptedInvitation, CreateInvitation, InvitationService, IssuedInvitation};
pub use resolver::{ClinicScope, TenantContext, TenantResolver};
