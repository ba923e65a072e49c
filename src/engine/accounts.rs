use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::registry::DriverRegistry;
use crate::error::AppError;
use crate::models::account::{Account, Caller, Role};
use crate::models::driver::{Driver, Vehicle};

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub vehicle: Option<Vehicle>,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub account: Account,
    pub token: String,
}

/// Accounts and the bearer tokens that resolve to them.
#[derive(Default)]
pub struct AccountDirectory {
    accounts: DashMap<Uuid, Account>,
    emails: DashMap<String, Uuid>,
    tokens: DashMap<String, Uuid>,
}

impl AccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, account_id: &Uuid) -> Option<Account> {
        self.accounts.get(account_id).map(|entry| entry.value().clone())
    }

    pub fn resolve(&self, token: &str) -> Option<Caller> {
        let account_id = *self.tokens.get(token)?;
        self.accounts.get(&account_id).map(|account| account.caller())
    }

    /// Creates the account, its token and, for drivers, the driver record.
    ///
    /// Everything that can fail is checked before the first write, and the
    /// email is claimed through a single map entry, so a registration either
    /// lands completely or not at all.
    pub fn register(
        &self,
        registry: &DriverRegistry,
        request: NewAccount,
    ) -> Result<Registration, AppError> {
        let first_name = required("first_name", &request.first_name)?;
        let last_name = required("last_name", &request.last_name)?;
        let email = required("email", &request.email)?.to_ascii_lowercase();
        if !email.contains('@') {
            return Err(AppError::BadRequest(format!("invalid email: {email}")));
        }

        let vehicle = match (request.role, request.vehicle) {
            (Role::Driver, Some(vehicle)) => Some(Vehicle {
                car_type: required("vehicle.car_type", &vehicle.car_type)?.to_string(),
                plate_number: required("vehicle.plate_number", &vehicle.plate_number)?
                    .to_string(),
            }),
            (Role::Driver, None) => {
                return Err(AppError::BadRequest(
                    "drivers must register a vehicle".to_string(),
                ));
            }
            (Role::Rider, _) => None,
        };

        let account = Account {
            id: Uuid::new_v4(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.clone(),
            role: request.role,
            created_at: Utc::now(),
        };

        match self.emails.entry(email) {
            Entry::Occupied(_) => {
                return Err(AppError::BadRequest(
                    "an account with this email already exists".to_string(),
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(account.id);
            }
        }

        if let Some(vehicle) = vehicle {
            let name = format!("{} {}", account.first_name, account.last_name);
            registry.register(Driver::new(account.id, name, vehicle));
        }

        let token = Uuid::new_v4().simple().to_string();
        self.accounts.insert(account.id, account.clone());
        self.tokens.insert(token.clone(), account.id);

        info!(account_id = %account.id, role = ?account.role, "account registered");

        Ok(Registration { account, token })
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AppError::BadRequest(format!("{field} cannot be empty")))
    } else {
        Ok(trimmed)
    }
}
