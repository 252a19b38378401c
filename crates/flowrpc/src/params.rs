// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed parameter lists.
//!
//! A call's parameters travel as JSON values next to one type descriptor
//! per parameter. Client and server derive the descriptors from the same
//! Rust types, so a signature mismatch surfaces as *method not found*.
//!
//! Descriptors are fixed strings from [`TypeDescriptor`], not
//! `std::any::type_name`, whose output may change between compiler
//! releases. Application types used as parameters implement the trait with
//! a name both sides agree on.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Tuple of call parameters.
pub trait ParamTuple: Sized {
    /// One descriptor per element, in order.
    fn type_descriptors() -> Vec<String>;

    fn into_values(self) -> Result<Vec<Value>, serde_json::Error>;

    fn from_values(values: Vec<Value>) -> Result<Self, String>;
}

/// Wire name of a parameter type.
///
/// ```
/// use flowrpc::params::TypeDescriptor;
///
/// struct Point;
///
/// impl TypeDescriptor for Point {
///     fn descriptor() -> String {
///         "geo.Point".to_string()
///     }
/// }
/// assert_eq!(<Vec<Point>>::descriptor(), "list<geo.Point>");
/// ```
pub trait TypeDescriptor {
    fn descriptor() -> String;
}

/// Descriptor for a single parameter type.
pub fn type_descriptor<T: TypeDescriptor + ?Sized>() -> String {
    T::descriptor()
}

macro_rules! describe {
    ($($ty:ty => $name:expr),+ $(,)?) => {
        $(
            impl TypeDescriptor for $ty {
                fn descriptor() -> String {
                    $name.to_string()
                }
            }
        )+
    };
}

describe! {
    bool => "bool",
    char => "char",
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    i128 => "i128",
    isize => "i64",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    u128 => "u128",
    usize => "u64",
    f32 => "f32",
    f64 => "f64",
    String => "string",
    str => "string",
    () => "unit",
    Value => "json",
}

impl<T: TypeDescriptor> TypeDescriptor for Vec<T> {
    fn descriptor() -> String {
        format!("list<{}>", T::descriptor())
    }
}

impl<T: TypeDescriptor> TypeDescriptor for Option<T> {
    fn descriptor() -> String {
        format!("option<{}>", T::descriptor())
    }
}

impl<T: TypeDescriptor + ?Sized> TypeDescriptor for Box<T> {
    fn descriptor() -> String {
        T::descriptor()
    }
}

impl<K: TypeDescriptor, V: TypeDescriptor, S> TypeDescriptor for HashMap<K, V, S> {
    fn descriptor() -> String {
        format!("map<{},{}>", K::descriptor(), V::descriptor())
    }
}

impl<K: TypeDescriptor, V: TypeDescriptor> TypeDescriptor for BTreeMap<K, V> {
    fn descriptor() -> String {
        format!("map<{},{}>", K::descriptor(), V::descriptor())
    }
}

impl ParamTuple for () {
    fn type_descriptors() -> Vec<String> {
        Vec::new()
    }

    fn into_values(self) -> Result<Vec<Value>, serde_json::Error> {
        Ok(Vec::new())
    }

    fn from_values(values: Vec<Value>) -> Result<Self, String> {
        if values.is_empty() {
            Ok(())
        } else {
            Err(format!("expected 0 arguments, got {}", values.len()))
        }
    }
}

macro_rules! impl_param_tuple {
    ($len:expr; $($name:ident),+) => {
        impl<$($name),+> ParamTuple for ($($name,)+)
        where
            $($name: Serialize + DeserializeOwned + TypeDescriptor),+
        {
            fn type_descriptors() -> Vec<String> {
                vec![$(type_descriptor::<$name>()),+]
            }

            #[allow(non_snake_case)]
            fn into_values(self) -> Result<Vec<Value>, serde_json::Error> {
                let ($($name,)+) = self;
                Ok(vec![$(serde_json::to_value($name)?),+])
            }

            fn from_values(values: Vec<Value>) -> Result<Self, String> {
                if values.len() != $len {
                    return Err(format!("expected {} arguments, got {}", $len, values.len()));
                }
                let mut values = values.into_iter().enumerate();
                Ok(($(
                    {
                        let (idx, value) = values
                            .next()
                            .ok_or_else(|| "argument list ended early".to_string())?;
                        serde_json::from_value::<$name>(value)
                            .map_err(|e| format!("argument {}: {}", idx, e))?
                    },
                )+))
            }
        }
    };
}

impl_param_tuple!(1; A);
impl_param_tuple!(2; A, B);
impl_param_tuple!(3; A, B, C);
impl_param_tuple!(4; A, B, C, D);
impl_param_tuple!(5; A, B, C, D, E);
impl_param_tuple!(6; A, B, C, D, E, F);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptors_follow_types() {
        assert_eq!(
            <(String, u32)>::type_descriptors(),
            vec![type_descriptor::<String>(), type_descriptor::<u32>()]
        );
        assert!(<()>::type_descriptors().is_empty());
        assert_ne!(<(i64,)>::type_descriptors(), <(u64,)>::type_descriptors());
    }

    #[test]
    fn test_descriptors_are_fixed_strings() {
        assert_eq!(
            <(String, Vec<u32>, Option<bool>)>::type_descriptors(),
            vec!["string", "list<u32>", "option<bool>"]
        );
        assert_eq!(
            <BTreeMap<String, f64>>::descriptor(),
            <HashMap<String, f64>>::descriptor()
        );
        // Platform-sized integers share the 64-bit name
        assert_eq!(usize::descriptor(), u64::descriptor());
    }

    #[test]
    fn test_values_both_ways() {
        let values = ("world".to_string(), 3u32).into_values().expect("values");
        assert_eq!(values, vec![json!("world"), json!(3)]);
        let back = <(String, u32)>::from_values(values).expect("decode");
        assert_eq!(back, ("world".to_string(), 3));
    }

    #[test]
    fn test_arity_and_type_errors() {
        assert!(<(String,)>::from_values(vec![]).is_err());
        assert!(<()>::from_values(vec![json!(1)]).is_err());
        let err = <(u32,)>::from_values(vec![json!("nope")]).expect_err("type");
        assert!(err.starts_with("argument 0"));
    }
}
