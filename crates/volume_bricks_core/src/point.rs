use core::ops::{Add, AddAssign, Mul, Sub, SubAssign};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A point wrapping a primitive array. Volume geometry only ever needs the three spatial axes, so everything lives on
/// `Point3<T>`. Arithmetic is componentwise.
///
/// ```
/// use volume_bricks_core::PointN;
///
/// let p1 = PointN([1u64, 2, 3]);
/// let p2 = PointN([3u64, 4, 5]);
///
/// assert_eq!(p1 + p2, PointN([4, 6, 8]));
/// assert_eq!(p2 - p1, PointN([2, 2, 2]));
/// assert_eq!(p1 * 2, PointN([2, 4, 6]));
/// ```
///
/// Points are only partially ordered: `a < b` requires every axis of `a` to be below the same axis of `b`.
///
/// ```
/// use volume_bricks_core::PointN;
///
/// let min = PointN([0u64, 0, 0]);
/// let least_upper_bound = PointN([3u64, 3, 3]);
///
/// let p = PointN([0u64, 1, 2]);
/// assert!(min <= p && p < least_upper_bound);
/// ```
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct PointN<N>(pub N);

/// A 3-dimensional point with scalar type `T`.
pub type Point3<T> = PointN<[T; 3]>;
/// A 3-dimensional point with scalar type `u64`. Used for voxel coordinates, domain sizes and brick counts.
pub type Point3u = PointN<[u64; 3]>;
/// A 3-dimensional point with scalar type `f32`.
pub type Point3f = PointN<[f32; 3]>;

impl<T> Point3<T>
where
    T: Copy,
{
    #[inline]
    pub fn fill(value: T) -> Self {
        PointN([value; 3])
    }

    #[inline]
    pub fn x(&self) -> T {
        self.0[0]
    }

    #[inline]
    pub fn y(&self) -> T {
        self.0[1]
    }

    #[inline]
    pub fn z(&self) -> T {
        self.0[2]
    }

    /// X = 0, Y = 1, Z = 2.
    #[inline]
    pub fn at(&self, axis: usize) -> T {
        self.0[axis]
    }

    #[inline]
    pub fn at_mut(&mut self, axis: usize) -> &mut T {
        &mut self.0[axis]
    }

    /// Returns the point after applying `f` component-wise.
    #[inline]
    pub fn map_components<S>(&self, f: impl Fn(T) -> S) -> Point3<S> {
        PointN([f(self.x()), f(self.y()), f(self.z())])
    }

    /// Returns the point after applying `f` to each pair of components.
    #[inline]
    pub fn zip_components<S, R>(&self, other: &Point3<S>, f: impl Fn(T, S) -> R) -> Point3<R>
    where
        S: Copy,
    {
        PointN([
            f(self.x(), other.x()),
            f(self.y(), other.y()),
            f(self.z(), other.z()),
        ])
    }
}

impl<T> Point3<T>
where
    T: Copy + Mul<Output = T>,
{
    /// The product of all components.
    #[inline]
    pub fn volume(&self) -> T {
        self.x() * self.y() * self.z()
    }
}

impl<T> Point3<T>
where
    T: Copy + PartialOrd,
{
    /// The largest component.
    #[inline]
    pub fn max_component(&self) -> T {
        let mut m = self.x();
        for &c in &self.0[1..] {
            if c > m {
                m = c;
            }
        }
        m
    }

    /// Component-wise maximum.
    #[inline]
    pub fn join(&self, other: &Self) -> Self {
        self.zip_components(other, |a, b| if b > a { b } else { a })
    }

    /// Component-wise minimum.
    #[inline]
    pub fn meet(&self, other: &Self) -> Self {
        self.zip_components(other, |a, b| if b < a { b } else { a })
    }
}

impl Point3u {
    pub const ZERO: Self = PointN([0; 3]);
    pub const ONES: Self = PointN([1; 3]);

    /// Subtraction that saturates at zero on each axis.
    #[inline]
    pub fn saturating_sub(&self, other: &Self) -> Self {
        self.zip_components(other, |a, b| a.saturating_sub(b))
    }

    /// Shifts every axis right. Shifting past the width gives 0.
    #[inline]
    pub fn right_shift(&self, shift_by: u32) -> Self {
        self.map_components(|c| c.checked_shr(shift_by).unwrap_or(0))
    }

    /// Number of voxels spanned by a shape, as a `usize`.
    #[inline]
    pub fn num_points(&self) -> usize {
        self.volume() as usize
    }
}

impl From<Point3u> for Point3f {
    fn from(p: Point3u) -> Self {
        p.map_components(|c| c as f32)
    }
}

impl<T> From<[T; 3]> for Point3<T> {
    fn from(a: [T; 3]) -> Self {
        PointN(a)
    }
}

impl<T> Add for Point3<T>
where
    T: AddAssign + Copy,
{
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        let mut sum = self;
        sum += rhs;

        sum
    }
}

impl<T> AddAssign for Point3<T>
where
    T: AddAssign + Copy,
{
    fn add_assign(&mut self, rhs: Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a += *b;
        }
    }
}

impl<T> Sub for Point3<T>
where
    T: SubAssign + Copy,
{
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        let mut diff = self;
        diff -= rhs;

        diff
    }
}

impl<T> SubAssign for Point3<T>
where
    T: SubAssign + Copy,
{
    fn sub_assign(&mut self, rhs: Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a -= *b;
        }
    }
}

impl<T> Mul<T> for Point3<T>
where
    T: Copy + Mul<Output = T>,
{
    type Output = Self;

    fn mul(self, rhs: T) -> Self {
        self.map_components(|c| c * rhs)
    }
}

impl<T> Mul<Point3<T>> for Point3<T>
where
    T: Copy + Mul<Output = T>,
{
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.zip_components(&rhs, |a, b| a * b)
    }
}

// Componentwise: `a < b` only if every axis of `a` is below the same axis of `b`. Extent containment is written in these terms.
impl<T> PartialOrd for Point3<T>
where
    T: Copy + PartialOrd,
{
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        use core::cmp::Ordering;

        if self == other {
            Some(Ordering::Equal)
        } else if self < other {
            Some(Ordering::Less)
        } else if self > other {
            Some(Ordering::Greater)
        } else {
            None
        }
    }

    fn lt(&self, other: &Self) -> bool {
        self.x() < other.x() && self.y() < other.y() && self.z() < other.z()
    }

    fn gt(&self, other: &Self) -> bool {
        self.x() > other.x() && self.y() > other.y() && self.z() > other.z()
    }

    fn le(&self, other: &Self) -> bool {
        self.x() <= other.x() && self.y() <= other.y() && self.z() <= other.z()
    }

    fn ge(&self, other: &Self) -> bool {
        self.x() >= other.x() && self.y() >= other.y() && self.z() >= other.z()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
