use super::error::TypeError;
use super::sql_value::{ColumnType, SqlValue};
use super::type_registry::{ScalarCodec, TypeRegistry};

// Integer columns accept any narrower integer representation on the way back,
// since executors are free to widen.

fn read_i64(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::TinyInt(v) => Some(*v as i64),
        SqlValue::SmallInt(v) => Some(*v as i64),
        SqlValue::Integer(v) => Some(*v as i64),
        SqlValue::BigInt(v) => Some(*v),
        _ => None,
    }
}

fn read_f64(value: &SqlValue) -> Option<f64> {
    match value {
        SqlValue::Real(v) => Some(*v as f64),
        SqlValue::Double(v) => Some(*v),
        _ => None,
    }
}

/// Registers all built-in scalar codecs.
///
/// # Arguments
/// * `registry` - Type registry to register codecs into
///
/// # Returns
/// `Ok(())` if all codecs were registered, `Err(TypeError)` if any already exists.
pub fn register_builtin_types(registry: &TypeRegistry) -> Result<(), TypeError> {
    registry.register(ScalarCodec::new::<bool>(
        ColumnType::Boolean,
        |v| SqlValue::Boolean(*v),
        |v| match v {
            SqlValue::Boolean(v) => Some(*v),
            _ => None,
        },
    ))?;

    registry.register(ScalarCodec::new::<i8>(
        ColumnType::TinyInt,
        |v| SqlValue::TinyInt(*v),
        |v| read_i64(v).and_then(|v| i8::try_from(v).ok()),
    ))?;

    registry.register(ScalarCodec::new::<i16>(
        ColumnType::SmallInt,
        |v| SqlValue::SmallInt(*v),
        |v| read_i64(v).and_then(|v| i16::try_from(v).ok()),
    ))?;

    registry.register(ScalarCodec::new::<i32>(
        ColumnType::Integer,
        |v| SqlValue::Integer(*v),
        |v| read_i64(v).and_then(|v| i32::try_from(v).ok()),
    ))?;

    registry.register(ScalarCodec::new::<i64>(
        ColumnType::BigInt,
        |v| SqlValue::BigInt(*v),
        read_i64,
    ))?;

    registry.register(ScalarCodec::new::<f32>(
        ColumnType::Real,
        |v| SqlValue::Real(*v),
        |v| read_f64(v).map(|v| v as f32),
    ))?;

    registry.register(ScalarCodec::new::<f64>(
        ColumnType::Double,
        |v| SqlValue::Double(*v),
        read_f64,
    ))?;

    registry.register(ScalarCodec::new::<char>(
        ColumnType::Text,
        |v| SqlValue::Text(v.to_string()),
        |v| match v {
            SqlValue::Text(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                }
            }
            _ => None,
        },
    ))?;

    registry.register(ScalarCodec::new::<String>(
        ColumnType::Text,
        |v| SqlValue::Text(v.clone()),
        |v| match v {
            SqlValue::Text(s) => Some(s.clone()),
            _ => None,
        },
    ))?;

    registry.register(ScalarCodec::new::<Vec<u8>>(
        ColumnType::Blob,
        |v| SqlValue::Blob(v.clone()),
        |v| match v {
            SqlValue::Blob(b) => Some(b.clone()),
            _ => None,
        },
    ))?;

    Ok(())
}
