//! Services the repository calls while saving.
//!
//! Each service is addressed by a stable identifier so applications can
//! tell which one is missing from a [`CoreError::ServiceUnavailable`]. A
//! missing service is only an error once an entity actually needs it.

use crate::entity::EntityKey;
use crate::error::{CoreError, CoreResult};
use crate::value::{Object, Value};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identifier of the key generator.
pub const KEY_GENERATOR: &str = "dorm.key_generator";
/// Identifier of the public reference generator.
pub const PUBLIC_REFERENCE_GENERATOR: &str = "dorm.public_reference.generator";
/// Identifier of the user record provider.
pub const USER_RECORD_PROVIDER: &str = "dorm.user_record.provider";
/// Identifier of the clock.
pub const CLOCK: &str = "dorm.clock";

/// Assigns keys to new entities.
pub trait KeyGenerator: Send + Sync {
    /// Returns a key that has never been handed out before.
    fn generate_key(&self) -> EntityKey;
}

/// Creates public references for new entities.
pub trait PublicReferenceGenerator: Send + Sync {
    /// Returns the reference for `subject`, or `None` to leave it empty.
    fn create(&self, subject: &Object) -> Option<String>;
}

/// Tells who is performing the current operation.
pub trait UserRecordProvider: Send + Sync {
    /// The record stored in created-by fields.
    fn user_record(&self) -> UserRecord;
}

/// Source of timestamps.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Random UUID keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidKeyGenerator;

impl KeyGenerator for UuidKeyGenerator {
    fn generate_key(&self) -> EntityKey {
        EntityKey::generate()
    }
}

/// References of the form `<TypeName>@<random hex>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeNamedReferenceGenerator;

impl PublicReferenceGenerator for TypeNamedReferenceGenerator {
    fn create(&self, subject: &Object) -> Option<String> {
        Some(format!("{}@{}", subject.type_name(), Uuid::new_v4().simple()))
    }
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Who performed an operation, as stored in created-by fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserRecord {
    /// Display name.
    pub name: String,
    /// Application user id.
    pub user_id: Option<String>,
    /// Client address.
    pub ip: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
}

impl UserRecord {
    /// Creates a record with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the user id.
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the client address.
    #[must_use]
    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Sets the client user agent.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// The map stored in a created-by field. Unset parts are omitted.
    pub fn to_value(&self) -> Value {
        let mut entries = BTreeMap::new();
        entries.insert("name".to_string(), Value::from(self.name.as_str()));
        for (key, part) in [
            ("userId", &self.user_id),
            ("ip", &self.ip),
            ("userAgent", &self.user_agent),
        ] {
            if let Some(part) = part {
                entries.insert(key.to_string(), Value::from(part.as_str()));
            }
        }
        Value::Map(entries)
    }

    /// Reads a record back from a created-by field.
    pub fn from_value(value: &Value) -> Option<Self> {
        let entries = value.as_map()?;
        let text = |key: &str| entries.get(key).and_then(Value::as_text).map(str::to_string);
        Some(Self {
            name: text("name")?,
            user_id: text("userId"),
            ip: text("ip"),
            user_agent: text("userAgent"),
        })
    }
}

/// The services available to repositories.
///
/// [`Services::with_defaults`] registers random keys, type-named public
/// references and the system clock. There is no default user record
/// provider; saving an entity with a created-by field requires one.
#[derive(Clone, Default)]
pub struct Services {
    key_generator: Option<Arc<dyn KeyGenerator>>,
    reference_generator: Option<Arc<dyn PublicReferenceGenerator>>,
    user_records: Option<Arc<dyn UserRecordProvider>>,
    clock: Option<Arc<dyn Clock>>,
}

impl Services {
    /// No services at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// The default key generator, reference generator and clock.
    pub fn with_defaults() -> Self {
        Self::new()
            .register_key_generator(Arc::new(UuidKeyGenerator))
            .register_reference_generator(Arc::new(TypeNamedReferenceGenerator))
            .register_clock(Arc::new(SystemClock))
    }

    /// Registers the key generator.
    #[must_use]
    pub fn register_key_generator(mut self, service: Arc<dyn KeyGenerator>) -> Self {
        self.key_generator = Some(service);
        self
    }

    /// Registers the public reference generator.
    #[must_use]
    pub fn register_reference_generator(mut self, service: Arc<dyn PublicReferenceGenerator>) -> Self {
        self.reference_generator = Some(service);
        self
    }

    /// Registers the user record provider.
    #[must_use]
    pub fn register_user_records(mut self, service: Arc<dyn UserRecordProvider>) -> Self {
        self.user_records = Some(service);
        self
    }

    /// Registers the clock.
    #[must_use]
    pub fn register_clock(mut self, service: Arc<dyn Clock>) -> Self {
        self.clock = Some(service);
        self
    }

    /// Returns true if a service is registered under `id`.
    pub fn has(&self, id: &str) -> bool {
        match id {
            KEY_GENERATOR => self.key_generator.is_some(),
            PUBLIC_REFERENCE_GENERATOR => self.reference_generator.is_some(),
            USER_RECORD_PROVIDER => self.user_records.is_some(),
            CLOCK => self.clock.is_some(),
            _ => false,
        }
    }

    /// The key generator.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::ServiceUnavailable`] if none is registered.
    pub fn key_generator(&self) -> CoreResult<&dyn KeyGenerator> {
        self.key_generator
            .as_deref()
            .ok_or_else(|| CoreError::service_unavailable(KEY_GENERATOR))
    }

    /// The public reference generator.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::ServiceUnavailable`] if none is registered.
    pub fn reference_generator(&self) -> CoreResult<&dyn PublicReferenceGenerator> {
        self.reference_generator
            .as_deref()
            .ok_or_else(|| CoreError::service_unavailable(PUBLIC_REFERENCE_GENERATOR))
    }

    /// The user record provider.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::ServiceUnavailable`] if none is registered.
    pub fn user_records(&self) -> CoreResult<&dyn UserRecordProvider> {
        self.user_records
            .as_deref()
            .ok_or_else(|| CoreError::service_unavailable(USER_RECORD_PROVIDER))
    }

    /// The clock.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::ServiceUnavailable`] if none is registered.
    pub fn clock(&self) -> CoreResult<&dyn Clock> {
        self.clock
            .as_deref()
            .ok_or_else(|| CoreError::service_unavailable(CLOCK))
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<&str> = [KEY_GENERATOR, PUBLIC_REFERENCE_GENERATOR, USER_RECORD_PROVIDER, CLOCK]
            .into_iter()
            .filter(|id| self.has(id))
            .collect();
        f.debug_struct("Services").field("registered", &registered).finish()
    }
}
