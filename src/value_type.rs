/// Target type for optional post-read value coercion.
/// `Native` leaves the materialized buffer untouched in its on-disk shape;
/// `Integer`/`Real` request the element-by-element cast into `i64`/`f64`
/// described in [`crate::h5::coercion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueType {
    #[default]
    Native,
    Integer,
    Real,
}
