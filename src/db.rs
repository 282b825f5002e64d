use core::fmt::Debug;
use std::sync::OnceLock;

use bb8_postgres::{PostgresConnectionManager, bb8};
use tokio_postgres::{
    NoTls,
    types::{IsNull, Kind, ToSql, Type, to_sql_checked},
};

use crate::event::Value;

pub type ConnectionManager = PostgresConnectionManager<NoTls>;
pub type Pool = bb8::Pool<ConnectionManager>;
pub type PooledConnection = bb8::PooledConnection<'static, ConnectionManager>;
pub type DBError = tokio_postgres::Error;
pub type BB8Error = bb8::RunError<DBError>;
pub type DBResult<T> = Result<T, DBError>;

static POOL: OnceLock<Pool> = OnceLock::new();

pub mod constants {
    use core::time::Duration;

    macro_rules! env_or_default {
        ($name:expr, $default:expr) => {
            if let Some(s) = option_env!($name) {
                s
            } else {
                $default
            }
        };
    }

    pub const HOST: &str = env_or_default!("DB_HOST", "/var/run/postgresql");
    pub const USER: &str = env_or_default!("DB_USER", "database");
    pub const DBNAME: &str = env_or_default!("DB_NAME", "bgpstream");
    pub const PASSWORD: Option<&str> = option_env!("DB_PASSWORD");
    pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Where and as whom to connect. Unset fields fall back to [`constants`].
#[derive(Clone, Debug, Default)]
pub struct DBConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub dbname: Option<String>,
    pub password: Option<String>,
}

impl DBConfig {
    pub fn to_postgres(&self) -> tokio_postgres::Config {
        use constants::{CONNECTION_TIMEOUT, DBNAME, HOST, PASSWORD, USER};

        let mut config = tokio_postgres::Config::new();
        config
            .host(self.host.as_deref().unwrap_or(HOST))
            .user(self.user.as_deref().unwrap_or(USER))
            .dbname(self.dbname.as_deref().unwrap_or(DBNAME))
            .connect_timeout(CONNECTION_TIMEOUT);
        if let Some(password) = self.password.as_deref().or(PASSWORD) {
            config.password(password);
        }
        config
    }
}

/// Opens the process-wide pool. Ingestion is sequential, so one connection suffices.
pub async fn init_db(config: &DBConfig) -> Result<(), BB8Error> {
    let manager = PostgresConnectionManager::new(config.to_postgres(), NoTls);

    let pool = Pool::builder()
        .max_size(1)
        .connection_timeout(constants::CONNECTION_TIMEOUT)
        .build(manager)
        .await?;

    // fail early on bad credentials instead of on the first event
    drop(pool.get().await?);

    if POOL.set(pool).is_err() {
        tracing::warn!(target: "db", "pool already initialized, keeping the first one");
    }
    Ok(())
}

/// A connection from the pool opened by [`init_db`].
pub async fn get_connection() -> anyhow::Result<PooledConnection> {
    let Some(pool) = POOL.get() else {
        anyhow::bail!("database pool used before init_db");
    };
    Ok(pool.get().await?)
}

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Self::Int(v) => v.to_sql(ty, out),
            Self::Fraction(v) => v.to_sql(ty, out),
            Self::Text(v) => v.as_str().to_sql(ty, out),
            Self::Time(v) => v.to_sql(ty, out),
            Self::List(_) => Err("list values must be expanded before binding".into()),
        }
    }

    #[inline]
    fn accepts(ty: &Type) -> bool {
        <i64 as ToSql>::accepts(ty)
            || <f64 as ToSql>::accepts(ty)
            || <&str as ToSql>::accepts(ty)
            || <chrono::NaiveDateTime as ToSql>::accepts(ty)
    }

    to_sql_checked!();
}

#[derive(Debug)]
#[repr(transparent)]
pub struct ToSqlIter<T>(pub T);

impl<T, U> ToSql for ToSqlIter<T>
where
    T: ExactSizeIterator<Item = U> + Clone + Debug,
    U: ToSql,
{
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        let Kind::Array(member_type) = ty.kind() else {
            return Err(format!("expected array type, got {ty}").into());
        };

        let lower_bound = match *ty {
            Type::OID_VECTOR | Type::INT2_VECTOR => 0,
            _ => 1,
        };

        let dimension = postgres_protocol::types::ArrayDimension {
            len: self.0.len().try_into()?,
            lower_bound,
        };

        postgres_protocol::types::array_to_sql(
            Some(dimension),
            member_type.oid(),
            self.0.clone(),
            |e, w| match e.to_sql(member_type, w)? {
                IsNull::No => Ok(postgres_protocol::IsNull::No),
                IsNull::Yes => Ok(postgres_protocol::IsNull::Yes),
            },
            out,
        )?;
        Ok(IsNull::No)
    }

    #[inline]
    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
