//! Serde adapters for float fields that have to survive text archives.
//!
//! JSON has no literal for infinities or NaN and `serde_json` writes them as `null`,
//! which it then refuses to read back. In human-readable formats these adapters write
//! non-finite values as the strings `"inf"`, `"-inf"` and `"NaN"` and accept them on
//! the way in. Binary formats see plain floats.

use super::MatrixElem;
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

const INF: &str = "inf";
const NEG_INF: &str = "-inf";
const NAN: &str = "NaN";

/// One element, spelled as a string when it is not finite.
struct Elem<T>(T);

impl<T: MatrixElem> Serialize for Elem<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self.0;
        if !serializer.is_human_readable() || value.is_finite() {
            return value.serialize(serializer);
        }

        let text = if value.is_nan() {
            NAN
        } else if value.is_sign_negative() {
            NEG_INF
        } else {
            INF
        };
        serializer.serialize_str(text)
    }
}

impl<'de, T: MatrixElem> Deserialize<'de> for Elem<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if !deserializer.is_human_readable() {
            return T::deserialize(deserializer).map(Elem);
        }
        deserializer.deserialize_any(ElemVisitor(PhantomData))
    }
}

struct ElemVisitor<T>(PhantomData<T>);

impl<T: MatrixElem> ElemVisitor<T> {
    fn cast<E: de::Error>(&self, value: f64) -> Result<Elem<T>, E> {
        T::from_f64(value)
            .map(Elem)
            .ok_or_else(|| E::custom(format!("{value} does not fit {}", T::DTYPE.name())))
    }
}

impl<'de, T: MatrixElem> Visitor<'de> for ElemVisitor<T> {
    type Value = Elem<T>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a number or one of \"{INF}\", \"{NEG_INF}\", \"{NAN}\"")
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        self.cast(value)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        self.cast(value as f64)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        self.cast(value as f64)
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        match value {
            INF => Ok(Elem(T::infinity())),
            NEG_INF => Ok(Elem(T::neg_infinity())),
            NAN => Ok(Elem(T::nan())),
            _ => Err(E::invalid_value(de::Unexpected::Str(value), &self)),
        }
    }
}

/// `#[serde(with)]` adapter for a single float.
pub(crate) mod scalar {
    use super::Elem;
    use crate::matrix::MatrixElem;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T: MatrixElem, S: Serializer>(
        value: &T,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        Elem(*value).serialize(serializer)
    }

    pub fn deserialize<'de, T: MatrixElem, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<T, D::Error> {
        Elem::<T>::deserialize(deserializer).map(|elem| elem.0)
    }
}

/// `#[serde(with)]` adapter for a vector of floats.
pub(crate) mod seq {
    use super::Elem;
    use crate::matrix::MatrixElem;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<T: MatrixElem, S: Serializer>(
        values: &[T],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|&value| Elem(value)))
    }

    pub fn deserialize<'de, T: MatrixElem, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<T>, D::Error> {
        let elems = Vec::<Elem<T>>::deserialize(deserializer)?;
        Ok(elems.into_iter().map(|elem| elem.0).collect())
    }
}
