//! Test data generators for synthetic well images.
//!
//! Pixel values encode their origin so a composited plate can be checked
//! pixel by pixel against the well that should have supplied it.

/// Value stored in every plane or time step other than the first.
///
/// Only plane 0 and time step 0 are composited, so this value must never
/// appear in a plate.
pub const OFF_PLANE_VALUE: u32 = u32::MAX;

/// Pixel value of a well at `(channel, y, x)`.
///
/// Calculated as: `seed * 1_000_000 + channel * 100_000 + y * 1000 + x`
///
/// Unique per well for `seed` values below 4000, `channel < 10` and
/// `y, x < 1000`.
///
/// # Example
///
/// ```
/// use test_utils::pixel_value;
///
/// assert_eq!(pixel_value(2, 1, 3, 4), 2_103_004);
/// ```
pub fn pixel_value(seed: u32, channel: u64, y: u64, x: u64) -> u32 {
    seed * 1_000_000 + (channel * 100_000 + y * 1000 + x) as u32
}

/// Creates the pixels of a `[t, c, z, y, x]` well array in row-major order.
///
/// Plane 0 at time step 0 holds [`pixel_value`]; every other plane and time
/// step holds [`OFF_PLANE_VALUE`].
///
/// # Arguments
///
/// * `seed` - Well identifier encoded in the values
/// * `shape` - Array shape `[t, c, z, y, x]`
pub fn create_well_pixels(seed: u32, shape: [u64; 5]) -> Vec<u32> {
    let [timesteps, channels, planes, rows, cols] = shape;
    let mut data = Vec::with_capacity(shape.iter().product::<u64>() as usize);
    for t in 0..timesteps {
        for c in 0..channels {
            for z in 0..planes {
                for y in 0..rows {
                    for x in 0..cols {
                        if t == 0 && z == 0 {
                            data.push(pixel_value(seed, c, y, x));
                        } else {
                            data.push(OFF_PLANE_VALUE);
                        }
                    }
                }
            }
        }
    }
    data
}

/// Creates a `rows` x `cols` ramp where value = `(y * cols + x) % 251`.
pub fn create_ramp<T: From<u8>>(rows: usize, cols: usize) -> Vec<T> {
    (0..rows * cols).map(|i| T::from((i % 251) as u8)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_well_pixels() {
        let data = create_well_pixels(3, [1, 2, 2, 2, 3]);
        assert_eq!(data.len(), 24);
        // c=0, z=0, y=0, x=1
        assert_eq!(data[1], 3_000_001);
        // c=0, z=1 is off-plane
        assert_eq!(data[6], OFF_PLANE_VALUE);
        // c=1, z=0, y=1, x=2
        assert_eq!(data[12 + 5], 3_101_002);
    }

    #[test]
    fn test_create_ramp() {
        let data: Vec<u16> = create_ramp(2, 3);
        assert_eq!(data, vec![0, 1, 2, 3, 4, 5]);
    }
}
