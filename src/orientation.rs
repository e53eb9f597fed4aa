//! Rotation offsets between the sensor, the display and the saved output.
//!
//! All angles are clockwise degrees in `0..360`.

use crate::settings::Facing;

/// Rotation that maps sensor frames onto the view
pub fn sensor_to_view(facing: Facing, sensor: u32, display: u32) -> u32 {
    match facing {
        Facing::Front => (360 - (sensor + display) % 360) % 360,
        Facing::Back => (sensor + 360 - display % 360) % 360,
    }
}

/// Rotation to apply to captured output given the device orientation
pub fn sensor_to_output(facing: Facing, sensor: u32, device: u32) -> u32 {
    match facing {
        Facing::Front => (sensor + 360 - device % 360) % 360,
        Facing::Back => (sensor + device) % 360,
    }
}

/// Whether sensor sizes have to be flipped to match the view
pub fn should_flip_sizes(sensor: u32) -> bool {
    sensor % 180 != 0
}

/// Whether the output and the view share an axis
pub fn output_matches_view(sensor_to_output: u32, sensor_to_view: u32) -> bool {
    (sensor_to_output + sensor_to_view + 180) % 180 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_to_view() {
        assert_eq!(sensor_to_view(Facing::Back, 90, 0), 90);
        assert_eq!(sensor_to_view(Facing::Back, 90, 180), 270);
        assert_eq!(sensor_to_view(Facing::Front, 270, 0), 90);
        assert_eq!(sensor_to_view(Facing::Front, 270, 90), 0);
    }

    #[test]
    fn test_sensor_to_output() {
        assert_eq!(sensor_to_output(Facing::Back, 90, 0), 90);
        assert_eq!(sensor_to_output(Facing::Back, 90, 270), 0);
        assert_eq!(sensor_to_output(Facing::Front, 270, 90), 180);
        assert_eq!(sensor_to_output(Facing::Front, 270, 0), 270);
    }

    #[test]
    fn test_flip_and_match() {
        assert!(should_flip_sizes(90));
        assert!(should_flip_sizes(270));
        assert!(!should_flip_sizes(180));

        assert!(output_matches_view(90, 90));
        assert!(!output_matches_view(0, 90));
    }
}
