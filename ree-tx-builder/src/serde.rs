//! Decimal-string encoding for integers that do not survive a round trip through JSON numbers.

use std::{fmt::Display, str::FromStr};

use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

fn serialize_display<T: Display, S: Serializer>(num: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(num)
}

fn deserialize_parsed<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: FromStr,
    T::Err: Display,
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse::<T>().map_err(D::Error::custom)
}

pub fn serialize_u128<S: Serializer>(num: &u128, serializer: S) -> Result<S::Ok, S::Error> {
    serialize_display(num, serializer)
}

pub fn deserialize_u128<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
    deserialize_parsed(deserializer)
}

pub fn serialize_u64<S: Serializer>(num: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serialize_display(num, serializer)
}

pub fn deserialize_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    deserialize_parsed(deserializer)
}
