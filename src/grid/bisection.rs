/*
Copyright 2024 oceanbin developers

This file is part of oceanbin.

oceanbin is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

oceanbin is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with oceanbin. If not, see https://www.gnu.org/licenses/.
*/

//! Binary search of the axis interval containing a coordinate,
//! used to find the source cell of every resampled node.

use crate::errors::SearchError;
use std::cmp::Ordering;

/// Core bisection function, simply an implementation
/// of binary search algorithm adapted to searching values
/// in-between the set items.
///
/// Works on ascending and descending arrays. Values that
/// cannot be ordered against the array (NaN) are out of bounds.
fn binary_search<T: PartialOrd>(array: &[T], x: &T) -> Result<usize, SearchError> {
    let (first, last) = match (array.first(), array.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(SearchError::EmptyArray),
    };

    if x.partial_cmp(first).is_none() || x.partial_cmp(last).is_none() {
        return Err(SearchError::OutOfBounds);
    }

    if x < first && x < last || x > first && x > last {
        return Err(SearchError::OutOfBounds);
    }

    let ascending = first < last;

    let mut lo = 0;
    let mut hi = array.len() - 1;

    // if the array is sorted descendingly we use a comparison with reversed sign
    while lo < hi {
        let mid = (lo + hi) / 2;

        let passed = if ascending {
            array[mid] >= *x
        } else {
            array[mid] <= *x
        };

        if passed {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }

    Ok(lo)
}

/// Finds the index of the closest array item lying
/// on the lower-index side of the searched value
/// (or equal to it).
pub fn find_left_closest<T: PartialOrd>(array: &[T], x: &T) -> Result<usize, SearchError> {
    let found_index = binary_search(array, x)?;

    if array[found_index].partial_cmp(x) == Some(Ordering::Equal) || found_index == 0 {
        Ok(found_index)
    } else {
        Ok(found_index - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::find_left_closest;
    use crate::errors::SearchError;

    #[test]
    fn ascending() {
        let axis = [0.0, 1.0, 2.0, 3.0];

        assert_eq!(find_left_closest(&axis, &0.0), Ok(0));
        assert_eq!(find_left_closest(&axis, &1.5), Ok(1));
        assert_eq!(find_left_closest(&axis, &2.0), Ok(2));
        assert_eq!(find_left_closest(&axis, &3.0), Ok(3));
        assert_eq!(find_left_closest(&axis, &3.5), Err(SearchError::OutOfBounds));
        assert_eq!(find_left_closest(&axis, &-0.1), Err(SearchError::OutOfBounds));
    }

    #[test]
    fn descending() {
        let axis = [65.0, 40.0, 15.0];

        assert_eq!(find_left_closest(&axis, &65.0), Ok(0));
        assert_eq!(find_left_closest(&axis, &50.0), Ok(0));
        assert_eq!(find_left_closest(&axis, &20.0), Ok(1));
        assert_eq!(find_left_closest(&axis, &15.0), Ok(2));
        assert_eq!(find_left_closest(&axis, &70.0), Err(SearchError::OutOfBounds));
    }

    #[test]
    fn degenerate() {
        let empty: [f32; 0] = [];

        assert_eq!(find_left_closest(&empty, &1.0), Err(SearchError::EmptyArray));
        assert_eq!(
            find_left_closest(&[0.0, 1.0], &f32::NAN),
            Err(SearchError::OutOfBounds)
        );
    }
}
