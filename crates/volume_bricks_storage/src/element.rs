//! Runtime element descriptors and the `Sample` trait that lets generic code operate on every supported scalar type.

use crate::{BrickError, Result};

use core::fmt;
use serde::{Deserialize, Serialize};

/// Numeric classification of one component.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ScalarKind {
    Unsigned,
    Signed,
    Float,
}

/// What one component of an element means.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ComponentSemantic {
    Scalar,
    Red,
    Green,
    Blue,
    Alpha,
    Label,
}

impl Default for ComponentSemantic {
    fn default() -> Self {
        ComponentSemantic::Scalar
    }
}

/// The semantic of every component: color channels for 3 and 4 components, otherwise `configured` repeated.
pub fn component_semantics(components: u8, configured: ComponentSemantic) -> Vec<ComponentSemantic> {
    use ComponentSemantic::*;

    match components {
        3 => vec![Red, Green, Blue],
        4 => vec![Red, Green, Blue, Alpha],
        n => vec![configured; n as usize],
    }
}

/// The type of one voxel: `components` values of `bit_width` bits each, all of the same `kind`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ElementType {
    pub bit_width: u8,
    pub kind: ScalarKind,
    pub components: u8,
}

pub const MAX_COMPONENTS: u8 = 4;

impl ElementType {
    /// Validates the combination before constructing it.
    pub fn new(bit_width: u8, kind: ScalarKind, components: u8) -> Result<Self> {
        if !matches!(bit_width, 8 | 16 | 32 | 64) {
            return Err(BrickError::configuration(format!(
                "unsupported component bit width {}",
                bit_width
            )));
        }
        if kind == ScalarKind::Float && bit_width < 32 {
            return Err(BrickError::configuration(format!(
                "{}-bit floating point data is not supported",
                bit_width
            )));
        }
        if components == 0 || components > MAX_COMPONENTS {
            return Err(BrickError::configuration(format!(
                "unsupported component count {} (1 to {} supported)",
                components, MAX_COMPONENTS
            )));
        }

        Ok(Self {
            bit_width,
            kind,
            components,
        })
    }

    /// Builds the element type from the flags used by raw-file tooling. Floats must be flagged as signed.
    pub fn from_flags(bit_width: u8, components: u8, signed: bool, is_float: bool) -> Result<Self> {
        let kind = match (is_float, signed) {
            (true, true) => ScalarKind::Float,
            (true, false) => {
                return Err(BrickError::configuration(
                    "floating point data must be flagged as signed",
                ))
            }
            (false, true) => ScalarKind::Signed,
            (false, false) => ScalarKind::Unsigned,
        };

        Self::new(bit_width, kind, components)
    }

    /// The element type of a sample type `T` with `components` components.
    pub fn of<T: Sample>(components: u8) -> Self {
        Self {
            bit_width: T::BIT_WIDTH,
            kind: T::KIND,
            components,
        }
    }

    #[inline]
    pub fn bytes_per_component(&self) -> usize {
        self.bit_width as usize / 8
    }

    #[inline]
    pub fn bytes_per_element(&self) -> usize {
        self.bytes_per_component() * self.components as usize
    }

    #[inline]
    pub fn is_signed(&self) -> bool {
        self.kind != ScalarKind::Unsigned
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        self.kind == ScalarKind::Float
    }

    /// The same component count with a different scalar type.
    pub fn with_scalar(&self, bit_width: u8, kind: ScalarKind) -> Self {
        Self {
            bit_width,
            kind,
            components: self.components,
        }
    }

    /// Human readable type name used in the key/value metadata block.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ScalarKind::Float => "float",
            ScalarKind::Signed => "signed integer",
            ScalarKind::Unsigned => "integer",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            ScalarKind::Unsigned => 'u',
            ScalarKind::Signed => 'i',
            ScalarKind::Float => 'f',
        };

        write!(f, "{}{}x{}", prefix, self.bit_width, self.components)
    }
}

/// Exact global value range of a stream. Integer ranges keep their full 64-bit precision.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum ScalarRange {
    Unsigned(u64, u64),
    Signed(i64, i64),
    Float(f64, f64),
}

impl ScalarRange {
    pub fn min_f64(&self) -> f64 {
        match *self {
            ScalarRange::Unsigned(min, _) => min as f64,
            ScalarRange::Signed(min, _) => min as f64,
            ScalarRange::Float(min, _) => min,
        }
    }

    pub fn max_f64(&self) -> f64 {
        match *self {
            ScalarRange::Unsigned(_, max) => max as f64,
            ScalarRange::Signed(_, max) => max as f64,
            ScalarRange::Float(_, max) => max,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        match *self {
            ScalarRange::Unsigned(min, max) => min == max,
            ScalarRange::Signed(min, max) => min == max,
            ScalarRange::Float(min, max) => min == max,
        }
    }

    /// Returns `true` iff every value in the range is exactly representable by an unsigned integer of `bit_width` bits.
    pub fn fits_unsigned(&self, bit_width: u8) -> bool {
        let limit = if bit_width >= 64 {
            u64::MAX
        } else {
            (1u64 << bit_width) - 1
        };
        match *self {
            ScalarRange::Unsigned(_, max) => max <= limit,
            ScalarRange::Signed(min, max) => min >= 0 && (max as u64) <= limit,
            ScalarRange::Float(..) => false,
        }
    }
}

/// A primitive scalar that can be stored in a voxel component.
pub trait Sample: bytemuck::Pod + Default + PartialOrd + fmt::Debug + Send + Sync + 'static {
    const KIND: ScalarKind;
    const BIT_WIDTH: u8;

    fn to_f64(self) -> f64;

    /// Converts from `f64`, rounding to nearest and saturating for integers.
    fn from_f64(value: f64) -> Self;

    fn range(min: Self, max: Self) -> ScalarRange;

    /// Samples that must be ignored by range analysis.
    #[inline]
    fn is_nan(self) -> bool {
        false
    }
}

macro_rules! impl_integer_sample {
    ($t:ty, $kind:ident, $bits:expr, $wide:ty) => {
        impl Sample for $t {
            const KIND: ScalarKind = ScalarKind::$kind;
            const BIT_WIDTH: u8 = $bits;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                // Float to integer casts saturate and map NaN to 0.
                value.round() as $t
            }

            #[inline]
            fn range(min: Self, max: Self) -> ScalarRange {
                ScalarRange::$kind(min as $wide, max as $wide)
            }
        }
    };
}

macro_rules! impl_float_sample {
    ($t:ty, $bits:expr) => {
        impl Sample for $t {
            const KIND: ScalarKind = ScalarKind::Float;
            const BIT_WIDTH: u8 = $bits;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $t
            }

            #[inline]
            fn range(min: Self, max: Self) -> ScalarRange {
                ScalarRange::Float(min as f64, max as f64)
            }

            #[inline]
            fn is_nan(self) -> bool {
                <$t>::is_nan(self)
            }
        }
    };
}

impl_integer_sample!(u8, Unsigned, 8, u64);
impl_integer_sample!(u16, Unsigned, 16, u64);
impl_integer_sample!(u32, Unsigned, 32, u64);
impl_integer_sample!(u64, Unsigned, 64, u64);
impl_integer_sample!(i8, Signed, 8, i64);
impl_integer_sample!(i16, Signed, 16, i64);
impl_integer_sample!(i32, Signed, 32, i64);
impl_integer_sample!(i64, Signed, 64, i64);
impl_float_sample!(f32, 32);
impl_float_sample!(f64, 64);

/// Dispatches a runtime `ElementType` to generic code. Binds `$t` to the matching `Sample` type inside `$body`, which must
/// evaluate to a `Result`.
///
/// ```
/// # use volume_bricks_storage::{match_sample_type, ElementType, Result, Sample, ScalarKind};
/// let element = ElementType::new(16, ScalarKind::Signed, 1)?;
/// let bits: u8 = match_sample_type!(element, T => Ok(T::BIT_WIDTH))?;
/// assert_eq!(bits, 16);
/// # Ok::<(), volume_bricks_storage::BrickError>(())
/// ```
#[macro_export]
macro_rules! match_sample_type {
    ($element:expr, $t:ident => $body:expr) => {{
        let element: $crate::ElementType = $element;
        match (element.kind, element.bit_width) {
            ($crate::ScalarKind::Unsigned, 8) => {
                type $t = u8;
                $body
            }
            ($crate::ScalarKind::Unsigned, 16) => {
                type $t = u16;
                $body
            }
            ($crate::ScalarKind::Unsigned, 32) => {
                type $t = u32;
                $body
            }
            ($crate::ScalarKind::Unsigned, 64) => {
                type $t = u64;
                $body
            }
            ($crate::ScalarKind::Signed, 8) => {
                type $t = i8;
                $body
            }
            ($crate::ScalarKind::Signed, 16) => {
                type $t = i16;
                $body
            }
            ($crate::ScalarKind::Signed, 32) => {
                type $t = i32;
                $body
            }
            ($crate::ScalarKind::Signed, 64) => {
                type $t = i64;
                $body
            }
            ($crate::ScalarKind::Float, 32) => {
                type $t = f32;
                $body
            }
            ($crate::ScalarKind::Float, 64) => {
                type $t = f64;
                $body
            }
            _ => Err($crate::BrickError::configuration(format!(
                "unsupported element type {}",
                element
            ))),
        }
    }};
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rejects_unsupported_combinations() {
        assert!(ElementType::new(12, ScalarKind::Unsigned, 1)
            .unwrap_err()
            .is_configuration());
        assert!(ElementType::new(16, ScalarKind::Float, 1)
            .unwrap_err()
            .is_configuration());
        assert!(ElementType::new(8, ScalarKind::Unsigned, 5)
            .unwrap_err()
            .is_configuration());
        assert!(ElementType::from_flags(32, 1, false, true)
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn from_flags_classifies() {
        assert_eq!(
            ElementType::from_flags(32, 1, true, true).unwrap(),
            ElementType::of::<f32>(1)
        );
        assert_eq!(
            ElementType::from_flags(16, 2, true, false).unwrap(),
            ElementType::of::<i16>(2)
        );
        assert_eq!(ElementType::of::<u16>(3).bytes_per_element(), 6);
    }

    #[test]
    fn integer_conversion_rounds_and_saturates() {
        assert_eq!(u8::from_f64(254.6), 255);
        assert_eq!(u8::from_f64(300.0), 255);
        assert_eq!(u8::from_f64(-3.0), 0);
        assert_eq!(i16::from_f64(-2.5), -3);
    }

    #[test]
    fn sixty_four_bit_ranges_are_exact() {
        let range = u64::range(u64::MAX - 1, u64::MAX);

        assert_eq!(range, ScalarRange::Unsigned(u64::MAX - 1, u64::MAX));
        assert!(!range.is_degenerate());
        assert!(!range.fits_unsigned(16));
        assert!(ScalarRange::Signed(0, 31).fits_unsigned(8));
        assert!(!ScalarRange::Signed(-1, 31).fits_unsigned(8));
    }

    #[test]
    fn semantics_table() {
        use ComponentSemantic::*;

        assert_eq!(component_semantics(4, Scalar), vec![Red, Green, Blue, Alpha]);
        assert_eq!(component_semantics(2, Label), vec![Label, Label]);
    }

    #[test]
    fn dispatch_by_runtime_type() {
        let element = ElementType::of::<f64>(1);
        let width: Result<usize> = match_sample_type!(element, T => Ok(std::mem::size_of::<T>()));

        assert_eq!(width.unwrap(), 8);
    }
}
