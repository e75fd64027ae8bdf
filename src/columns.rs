//! Column-oriented storage for repeated sub-structs
//!
//! Repeated sub-structs (soundings, sectors, sensor samples, ...) are decoded
//! row by row but stored one `Vec` per field, which is the layout downstream
//! numeric code and the sounding compressor want.

/// Generate a column struct for a row type
///
/// Every field of the row must be listed, so a missing column fails to compile.
macro_rules! columns {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident for $row:ident {
            $($field:ident : $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        $vis struct $name {
            $(
                #[doc = concat!("Column of `", stringify!($field), "` values")]
                pub $field: Vec<$ty>,
            )*
        }

        impl $name {
            /// Empty columns with room for `n` rows
            pub fn with_capacity(n: usize) -> Self {
                $name {
                    $($field: Vec::with_capacity(n),)*
                }
            }

            /// Number of rows
            pub fn len(&self) -> usize {
                [$(self.$field.len()),*].iter().copied().min().unwrap_or(0)
            }

            /// True if there are no rows
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Append one row
            pub fn push(&mut self, row: $row) {
                $(self.$field.push(row.$field);)*
            }

            /// Reassemble row `i`
            pub fn row(&self, i: usize) -> Option<$row> {
                if i >= self.len() {
                    return None;
                }
                Some($row {
                    $($field: self.$field[i].clone(),)*
                })
            }

            /// Iterate over the rows in order
            pub fn rows(&self) -> impl Iterator<Item = $row> + '_ {
                (0..self.len()).filter_map(move |i| self.row(i))
            }

            /// Keep only the rows for which `keep` returns true
            pub fn filter<F: Fn(&$row) -> bool>(&self, keep: F) -> Self {
                self.rows().filter(|r| keep(r)).collect()
            }
        }

        impl FromIterator<$row> for $name {
            fn from_iter<I: IntoIterator<Item = $row>>(iter: I) -> Self {
                let mut cols = $name::default();
                for row in iter {
                    cols.push(row);
                }
                cols
            }
        }

        impl From<Vec<$row>> for $name {
            fn from(rows: Vec<$row>) -> Self {
                rows.into_iter().collect()
            }
        }
    };
}
