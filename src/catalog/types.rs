use compact_str::CompactString;
use smallvec::SmallVec;
use std::fmt;

/// Declared type of a column; each maps onto one scalar tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataType {
    Timestamp,
    Integer,
    Numeric,
    String,
    Date,
    TimeSpan,
    Boolean,
}

impl DataType {
    pub fn name(self) -> &'static str {
        match self {
            DataType::Timestamp => "timestamp",
            DataType::Integer => "integer",
            DataType::Numeric => "numeric",
            DataType::String => "string",
            DataType::Date => "date",
            DataType::TimeSpan => "timespan",
            DataType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Three-valued boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Truth {
    Unknown,
    True,
    False,
}

impl From<bool> for Truth {
    fn from(value: bool) -> Self {
        if value { Truth::True } else { Truth::False }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Numeric {
    pub mantissa: i64,
    pub precision: i32,
    pub scale: i32,
}

/// Calendar date split into year, month and ticks since the first of the
/// month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    pub year: i32,
    pub month: i32,
    pub rest: i64,
}

/// Scalar field value. Ordering is by kind first, then by payload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Null,
    Timestamp(i64),
    Integer(i64),
    Numeric(Numeric),
    String(CompactString),
    Date(Date),
    TimeSpan(i64),
    Boolean(Truth),
}

impl Value {
    pub fn text(s: impl Into<CompactString>) -> Self {
        Value::String(s.into())
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Integer(_) => Some(DataType::Integer),
            Value::Numeric(_) => Some(DataType::Numeric),
            Value::String(_) => Some(DataType::String),
            Value::Date(_) => Some(DataType::Date),
            Value::TimeSpan(_) => Some(DataType::TimeSpan),
            Value::Boolean(_) => Some(DataType::Boolean),
        }
    }

    /// `Null` fits every column.
    pub fn fits(&self, data_type: DataType) -> bool {
        self.data_type().is_none_or(|t| t == data_type)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Timestamp(t) => write!(f, "timestamp {t}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Numeric(n) => write!(f, "{}e-{}", n.mantissa, n.scale),
            Value::String(s) => write!(f, "'{s}'"),
            Value::Date(d) => write!(f, "date {}-{:02}+{}", d.year, d.month, d.rest),
            Value::TimeSpan(t) => write!(f, "timespan {t}"),
            Value::Boolean(b) => write!(f, "{b:?}"),
        }
    }
}

/// Key tuple of one index entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey(SmallVec<[Value; 2]>);

impl IndexKey {
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self(values.into_iter().collect())
    }

    pub fn from_single(value: Value) -> Self {
        Self::from_values([value])
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn has_null(&self) -> bool {
        self.0.iter().any(Value::is_null)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::{DataType, IndexKey, Truth, Value};

    #[test]
    fn null_fits_any_column_type() {
        assert!(Value::Null.fits(DataType::Integer));
        assert!(Value::Integer(3).fits(DataType::Integer));
        assert!(!Value::text("x").fits(DataType::Integer));
        assert!(Value::Boolean(Truth::from(true)).fits(DataType::Boolean));
    }

    #[test]
    fn ordering_groups_by_kind_then_payload() {
        assert!(Value::Null < Value::Integer(i64::MIN));
        assert!(Value::Integer(-1) < Value::Integer(0));
        assert!(Value::Integer(i64::MAX) < Value::text(""));
        assert!(Value::text("a") < Value::text("b"));
    }

    #[test]
    fn composite_keys_compare_lexicographically() {
        let a = IndexKey::from_values([Value::Integer(1), Value::text("a")]);
        let b = IndexKey::from_values([Value::Integer(1), Value::text("b")]);
        let c = IndexKey::from_values([Value::Integer(2), Value::text("a")]);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.to_string(), "(1,'a')");
        assert!(IndexKey::from_values([Value::Null]).has_null());
    }
}
