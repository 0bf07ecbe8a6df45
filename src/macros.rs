#![allow(unused_macros)]

/// Implements [`crate::metadata::tables::ColumnField`] and `Default` for a `bitflags` type stored in a constant column.
///
/// Unknown bits are retained so that flags round-trip unchanged.
macro_rules! impl_column_flags {
    ($($flags:ty => $bits:ty),* $(,)?) => {
        $(
            impl crate::metadata::tables::ColumnField for $flags {
                fn to_value(&self) -> crate::metadata::tables::ColumnValue {
                    crate::metadata::tables::ColumnValue::Constant(u32::from(self.bits()))
                }

                fn from_value(value: crate::metadata::tables::ColumnValue) -> crate::Result<Self> {
                    let bits = <$bits as crate::metadata::tables::ColumnField>::from_value(value)?;
                    Ok(<$flags>::from_bits_retain(bits))
                }
            }

            impl Default for $flags {
                fn default() -> Self {
                    <$flags>::empty()
                }
            }
        )*
    };
}
