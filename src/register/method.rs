//! Typed host functions behind engine method calls
//!
//! Design: Host closures keep their static signatures. Each arity is lifted
//! into a type-erased thunk over `&[Variant]` by a blanket impl; the `Marker`
//! parameter keeps the impls for different arities and receivers apart.
//! - [`IntoMethod`]: `Fn(&mut T, A..) -> R` or `Fn(&T, A..) -> R`
//! - [`IntoStatic`]: `Fn(A..) -> R`
//! - [`IntoFunction`]: a static function or a constructor `Fn(Base) -> T`
//! - [`SignalArgs`]: argument tuples carried by signals

use std::sync::Arc;

use super::class::ExtensionClass;
use crate::error::CallError;
use crate::variant::{FromVariant, ToVariant, Variant, VariantType, VariantTyped};

/// Type-erased instance method
pub(crate) type MethodFn<T> =
    Box<dyn Fn(&mut T, &[Variant]) -> Result<Variant, CallError> + Send + Sync>;

/// Type-erased static method
pub(crate) type StaticFn = Box<dyn Fn(&[Variant]) -> Result<Variant, CallError> + Send + Sync>;

/// Constructor taking the freshly built base object
pub(crate) type CtorFn<T> = Arc<dyn Fn(<T as ExtensionClass>::Base) -> T + Send + Sync>;

/// Receiver markers
pub struct Exclusive;
pub struct Shared;
pub struct Static;
pub struct Ctor;

/// Parameter kinds and return kind
pub type Signature = (Vec<VariantType>, VariantType);

pub trait IntoMethod<T, Marker>: Send + Sync + 'static {
    fn signature() -> Signature;

    fn into_method(self, method: String) -> MethodFn<T>;
}

pub trait IntoStatic<Marker>: Send + Sync + 'static {
    fn signature() -> Signature;

    fn into_static(self, method: String) -> StaticFn;
}

/// Payload of [`Extra::Function`](super::Extra::Function)
pub enum FunctionKind<T: ExtensionClass> {
    Static { signature: Signature, call: StaticFn },
    Ctor(CtorFn<T>),
}

pub trait IntoFunction<T: ExtensionClass, Marker> {
    fn into_function(self, name: &str) -> FunctionKind<T>;
}

impl<T, F, M> IntoFunction<T, (Static, M)> for F
where
    T: ExtensionClass,
    F: IntoStatic<M>,
{
    fn into_function(self, name: &str) -> FunctionKind<T> {
        FunctionKind::Static {
            signature: F::signature(),
            call: self.into_static(name.to_string()),
        }
    }
}

impl<T, F> IntoFunction<T, Ctor> for F
where
    T: ExtensionClass,
    F: Fn(T::Base) -> T + Send + Sync + 'static,
{
    fn into_function(self, _name: &str) -> FunctionKind<T> {
        FunctionKind::Ctor(Arc::new(self))
    }
}

fn check_arity(method: &str, args: &[Variant], expected: usize) -> Result<(), CallError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(CallError::ArgCountMismatch {
            method: method.to_string(),
            expected,
            got: args.len(),
        })
    }
}

fn arg<A: FromVariant>(method: &str, args: &[Variant], index: usize) -> Result<A, CallError> {
    A::from_variant(&args[index]).map_err(|source| CallError::InvalidArgument {
        method: method.to_string(),
        index,
        source,
    })
}

macro_rules! impl_callables {
    ($($idx:tt $arg:ident $var:ident),*) => {
        impl<T, F, R, $($arg,)*> IntoMethod<T, (Exclusive, fn($($arg,)*) -> R)> for F
        where
            T: 'static,
            F: Fn(&mut T, $($arg),*) -> R + Send + Sync + 'static,
            R: ToVariant + VariantTyped,
            $($arg: FromVariant + VariantTyped,)*
        {
            fn signature() -> Signature {
                (vec![$($arg::VARIANT_TYPE),*], R::VARIANT_TYPE)
            }

            fn into_method(self, method: String) -> MethodFn<T> {
                Box::new(move |this: &mut T, args: &[Variant]| {
                    check_arity(&method, args, <[&str]>::len(&[$(stringify!($arg)),*]))?;
                    $(let $var = arg::<$arg>(&method, args, $idx)?;)*
                    Ok((self)(this, $($var),*).to_variant())
                })
            }
        }

        impl<T, F, R, $($arg,)*> IntoMethod<T, (Shared, fn($($arg,)*) -> R)> for F
        where
            T: 'static,
            F: Fn(&T, $($arg),*) -> R + Send + Sync + 'static,
            R: ToVariant + VariantTyped,
            $($arg: FromVariant + VariantTyped,)*
        {
            fn signature() -> Signature {
                (vec![$($arg::VARIANT_TYPE),*], R::VARIANT_TYPE)
            }

            fn into_method(self, method: String) -> MethodFn<T> {
                Box::new(move |this: &mut T, args: &[Variant]| {
                    check_arity(&method, args, <[&str]>::len(&[$(stringify!($arg)),*]))?;
                    $(let $var = arg::<$arg>(&method, args, $idx)?;)*
                    Ok((self)(&*this, $($var),*).to_variant())
                })
            }
        }

        impl<F, R, $($arg,)*> IntoStatic<fn($($arg,)*) -> R> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: ToVariant + VariantTyped,
            $($arg: FromVariant + VariantTyped,)*
        {
            fn signature() -> Signature {
                (vec![$($arg::VARIANT_TYPE),*], R::VARIANT_TYPE)
            }

            fn into_static(self, method: String) -> StaticFn {
                Box::new(move |args: &[Variant]| {
                    check_arity(&method, args, <[&str]>::len(&[$(stringify!($arg)),*]))?;
                    $(let $var = arg::<$arg>(&method, args, $idx)?;)*
                    Ok((self)($($var),*).to_variant())
                })
            }
        }
    };
}

impl_callables!();
impl_callables!(0 A0 a0);
impl_callables!(0 A0 a0, 1 A1 a1);
impl_callables!(0 A0 a0, 1 A1 a1, 2 A2 a2);
impl_callables!(0 A0 a0, 1 A1 a1, 2 A2 a2, 3 A3 a3);

/// Argument tuple of a signal
pub trait SignalArgs: Send + 'static {
    fn param_types() -> Vec<VariantType>;

    fn into_variants(self) -> Vec<Variant>;
}

macro_rules! impl_signal_args {
    ($($idx:tt $arg:ident),*) => {
        impl<$($arg,)*> SignalArgs for ($($arg,)*)
        where
            $($arg: ToVariant + VariantTyped + Send + 'static,)*
        {
            fn param_types() -> Vec<VariantType> {
                vec![$($arg::VARIANT_TYPE),*]
            }

            fn into_variants(self) -> Vec<Variant> {
                vec![$(self.$idx.to_variant()),*]
            }
        }
    };
}

impl_signal_args!();
impl_signal_args!(0 A0);
impl_signal_args!(0 A0, 1 A1);
impl_signal_args!(0 A0, 1 A1, 2 A2);
impl_signal_args!(0 A0, 1 A1, 2 A2, 3 A3);
