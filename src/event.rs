use core::fmt;

use chrono::NaiveDateTime;
use compact_str::CompactString;

use crate::util::TIMESTAMP_FORMAT;

/// The kind of anomaly an event page reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Outage,
    Hijack,
    Leak,
    Unknown,
}

impl EventKind {
    /// Table holding one row per event of this kind.
    pub const fn table(self) -> Option<Table> {
        match self {
            Self::Outage => Some(Table::Outage),
            Self::Hijack => Some(Table::Hijack),
            Self::Leak => Some(Table::Leak),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Outage => "Outage",
            Self::Hijack => "Hijack",
            Self::Leak => "Leak",
            Self::Unknown => "Unknown",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Outage,
    Hijack,
    Leak,
    /// Recipients of a leaked route, keyed by `leak`.
    Leaker,
}

impl Table {
    /// Tables whose `id` column is an event number.
    pub const EVENTS: [Self; 3] = [Self::Outage, Self::Hijack, Self::Leak];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Outage => "outage",
            Self::Hijack => "hijack",
            Self::Leak => "leak",
            Self::Leaker => "leaker",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Fraction(f64),
    Text(CompactString),
    Time(NaiveDateTime),
    List(Vec<Self>),
}

impl Value {
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Fraction(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

impl From<CompactString> for Value {
    fn from(value: CompactString) -> Self {
        Self::Text(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::Time(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Fraction(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Self::Time(v) => write!(f, "'{}'", v.format(TIMESTAMP_FORMAT)),
            Self::List(vs) => {
                f.write_str("[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Column name to value, in extraction order. Absent fields are simply missing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Columns(Vec<(&'static str, Value)>);

impl Columns {
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Sets `name`, replacing an earlier value in place.
    pub fn insert(&mut self, name: &'static str, value: impl Into<Value>) {
        let value = value.into();
        if let Some(slot) = self.0.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    /// Appends to the list stored under `name`, creating it when needed.
    pub fn push(&mut self, name: &'static str, value: impl Into<Value>) {
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, Value::List(list))) => list.push(value),
            Some((_, slot)) => *slot = Value::List(vec![value]),
            None => self.0.push((name, Value::List(vec![value]))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&'static str, &Value)> + Clone {
        self.0.iter().map(|(n, v)| (*n, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(&'static str, Value)> for Columns {
    fn from_iter<I: IntoIterator<Item = (&'static str, Value)>>(iter: I) -> Self {
        let mut columns = Self::new();
        for (name, value) in iter {
            columns.insert(name, value);
        }
        columns
    }
}

/// One row to be written into `table`.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub table: Table,
    pub columns: Columns,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "INSERT INTO {} (", self.table)?;
        for (i, (name, _)) in self.columns.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
        }
        f.write_str(") VALUES (")?;
        for (i, (_, value)) in self.columns.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(");")
    }
}
