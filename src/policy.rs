//! Role and redirect policy.
//! Pure functions only: no I/O, no clocks. The server applies `derive_role`
//! once at registration and persists the result; the client applies
//! `default_destination` to route after login.

use serde::{Deserialize, Serialize};

pub const ADMIN_DESTINATION: &str = "/admin/dashboard";
pub const CUSTOMER_DESTINATION: &str = "/customer/dashboard";
pub const LOGIN_DESTINATION: &str = "/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Customer,
}

/// Admin iff the email's domain suffix matches the operator's organizational
/// domain. Matching is on the full `@domain` boundary so `x@evilsssteelindia.com`
/// stays a customer.
pub fn derive_role(email: &str, admin_domain: &str) -> Role {
    let suffix = format!("@{}", admin_domain);
    if email.ends_with(&suffix) { Role::Admin } else { Role::Customer }
}

/// Post-login destination. Admins always land on the admin dashboard and any
/// caller-supplied redirect is ignored; customers get their requested
/// redirect when one was given.
pub fn default_destination(role: Role, explicit_redirect: Option<&str>) -> String {
    match role {
        Role::Admin => ADMIN_DESTINATION.to_string(),
        Role::Customer => explicit_redirect.unwrap_or(CUSTOMER_DESTINATION).to_string(),
    }
}
