//! # Field Mapping
//!
//! One-to-one conversions between drone readings and bus messages.
//!
//! | Reading | Message | Conversion |
//! |---------|---------|------------|
//! | battery (%) | `BatteryState.voltage` | none, the percentage is carried as-is |
//! | acceleration | `Imu.linear_acceleration` | none, orientation marked unavailable |
//! | height (cm) | `Range.range` | / 100 (meters), fixed 0.1 - 3.0 limits, infrared |
//! | speed | `TwistStamped.twist.linear` | none |
//! | temperature | `StringMsg.data` | textual rendering |
//! | frame | `Image` | `bgr8`, packed rows |
//!
//! Inbound `Twist` commands map to [`RcCommand`] by scaling each used axis
//! by 100 and truncating toward zero.

use crate::drone::{Frame, RcCommand, TelemetrySample};
use crate::msgs::geometry_msgs::{
    Quaternion, Transform, TransformStamped, Twist, TwistStamped, Vector3,
};
use crate::msgs::sensor_msgs::{BatteryState, Image, Imu, Range, BGR8, COVARIANCE_UNAVAILABLE};
use crate::msgs::std_msgs::{Header, StringMsg, Time};

/// Smallest height the range message advertises (m)
pub const RANGE_MIN_M: f32 = 0.1;

/// Largest height the range message advertises (m)
pub const RANGE_MAX_M: f32 = 3.0;

/// Factor between command units and rc channel units
pub const RC_SCALE: f64 = 100.0;

const CM_PER_M: f32 = 100.0;

fn header(stamp: Time, frame_id: &str) -> Header {
    Header {
        stamp,
        frame_id: frame_id.to_string(),
    }
}

/// Battery percentage in the `voltage` field. Nothing else is filled in.
pub fn battery_state(sample: &TelemetrySample) -> BatteryState {
    BatteryState {
        voltage: sample.battery as f32,
        ..BatteryState::default()
    }
}

pub fn imu(sample: &TelemetrySample, stamp: Time, frame_id: &str) -> Imu {
    let [x, y, z] = sample.acceleration;
    let mut imu = Imu {
        header: header(stamp, frame_id),
        linear_acceleration: Vector3::new(x, y, z),
        ..Imu::default()
    };
    imu.orientation_covariance[0] = COVARIANCE_UNAVAILABLE;
    imu
}

/// Height as an infrared range reading in meters.
///
/// The limits are fixed and the reading is not checked against them.
pub fn height_range(sample: &TelemetrySample, stamp: Time, frame_id: &str) -> Range {
    Range {
        header: header(stamp, frame_id),
        radiation_type: Range::INFRARED,
        field_of_view: 0.0,
        min_range: RANGE_MIN_M,
        max_range: RANGE_MAX_M,
        range: sample.height as f32 / CM_PER_M,
    }
}

pub fn velocity(sample: &TelemetrySample, stamp: Time, frame_id: &str) -> TwistStamped {
    let [x, y, z] = sample.speed;
    TwistStamped {
        header: header(stamp, frame_id),
        twist: Twist {
            linear: Vector3::new(f64::from(x), f64::from(y), f64::from(z)),
            angular: Vector3::default(),
        },
    }
}

/// Temperature as text, always with a fractional part (`40.0`, `63.5`).
pub fn temperature(sample: &TelemetrySample) -> StringMsg {
    StringMsg {
        data: format!("{:?}", sample.temperature),
    }
}

/// Wrap a decoded frame without copying its pixels.
pub fn camera_image(frame: Frame, stamp: Time) -> Image {
    Image {
        header: Header {
            stamp,
            frame_id: String::new(),
        },
        height: frame.height,
        width: frame.width,
        encoding: BGR8.to_string(),
        is_bigendian: 0,
        step: frame.step(),
        data: frame.data,
    }
}

/// Scale one command axis to rc units, truncating toward zero.
///
/// Out-of-range values saturate at the `i32` limits and NaN becomes 0.
///
/// # Examples
///
/// ```
/// use tello_bridge::bridge::mapping::scale_axis;
///
/// assert_eq!(scale_axis(0.5), 50);
/// assert_eq!(scale_axis(-0.019), -1);
/// assert_eq!(scale_axis(0.999), 99);
/// ```
pub fn scale_axis(value: f64) -> i32 {
    (value * RC_SCALE) as i32
}

/// Linear x/y/z and angular z, in that order, onto the four rc channels.
///
/// Linear and angular x/y beyond these four are ignored. No clamping is
/// applied here; the vehicle enforces its own limits.
pub fn rc_command(twist: &Twist) -> RcCommand {
    RcCommand {
        left_right: scale_axis(twist.linear.x),
        forward_back: scale_axis(twist.linear.y),
        up_down: scale_axis(twist.linear.z),
        yaw: scale_axis(twist.angular.z),
    }
}

/// Fixed world-to-body transform: zero translation, identity rotation.
pub fn static_transform(
    world_frame_id: &str,
    body_frame_id: &str,
    stamp: Time,
) -> TransformStamped {
    TransformStamped {
        header: header(stamp, world_frame_id),
        child_frame_id: body_frame_id.to_string(),
        transform: Transform {
            translation: Vector3::default(),
            rotation: Quaternion::identity(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn sample() -> TelemetrySample {
        TelemetrySample {
            battery: 87,
            acceleration: [12.0, -3.5, -998.0],
            height: 150,
            speed: [10, -20, 3],
            temperature: 63.5,
        }
    }

    fn stamp() -> Time {
        Time {
            sec: 1_700_000_000,
            nanosec: 5,
        }
    }

    #[test]
    fn test_battery_percentage_lands_in_voltage() {
        for battery in 0..=100 {
            let msg = battery_state(&TelemetrySample {
                battery,
                ..sample()
            });
            assert_eq!(msg.voltage, battery as f32, "battery {}", battery);
            assert_eq!(msg.percentage, 0.0);
        }
    }

    #[test]
    fn test_imu_mapping() {
        let msg = imu(&sample(), stamp(), "tello_base_link");
        assert_eq!(msg.linear_acceleration, Vector3::new(12.0, -3.5, -998.0));
        assert_eq!(msg.orientation_covariance[0], -1.0);
        assert!(msg.orientation_covariance[1..].iter().all(|&c| c == 0.0));
        assert_eq!(msg.header.frame_id, "tello_base_link");
        assert_eq!(msg.header.stamp, stamp());
    }

    #[test]
    fn test_height_in_meters_with_fixed_limits() {
        for height in [0, 1, 10, 99, 150, 300, 1000, 5000] {
            let msg = height_range(
                &TelemetrySample {
                    height,
                    ..sample()
                },
                stamp(),
                "tello_base_link",
            );
            assert_eq!(msg.range, height as f32 / 100.0, "height {}", height);
            assert_eq!(msg.min_range, 0.1);
            assert_eq!(msg.max_range, 3.0);
            assert_eq!(msg.radiation_type, Range::INFRARED);
        }
    }

    #[test]
    fn test_height_exact_values() {
        let msg = height_range(&sample(), stamp(), "tello_base_link");
        assert_eq!(msg.range, 1.5);
    }

    #[test]
    fn test_velocity_is_not_converted() {
        let msg = velocity(&sample(), stamp(), "tello_base_link");
        assert_eq!(msg.twist.linear, Vector3::new(10.0, -20.0, 3.0));
        assert_eq!(msg.twist.angular, Vector3::default());
        assert_eq!(msg.header.frame_id, "tello_base_link");
    }

    #[test]
    fn test_temperature_text() {
        assert_eq!(temperature(&sample()).data, "63.5");
        let whole = TelemetrySample {
            temperature: 40.0,
            ..sample()
        };
        assert_eq!(temperature(&whole).data, "40.0");
    }

    #[test]
    fn test_camera_image() {
        let frame = Frame {
            width: 4,
            height: 2,
            data: Bytes::from(vec![1u8; 24]),
        };
        let msg = camera_image(frame, stamp());
        assert_eq!(msg.encoding, "bgr8");
        assert_eq!((msg.width, msg.height, msg.step), (4, 2, 12));
        assert_eq!(msg.is_bigendian, 0);
        assert_eq!(msg.data.len(), 24);
        assert_eq!(msg.header.stamp, stamp());
    }

    #[test]
    fn test_scale_axis_truncates_toward_zero() {
        assert_eq!(scale_axis(0.0), 0);
        assert_eq!(scale_axis(1.0), 100);
        assert_eq!(scale_axis(0.129), 12);
        assert_eq!(scale_axis(-0.129), -12);
        assert_eq!(scale_axis(-0.005), 0);
        assert_eq!(scale_axis(2.5), 250);
    }

    #[test]
    fn test_scale_axis_edge_values() {
        assert_eq!(scale_axis(f64::NAN), 0);
        assert_eq!(scale_axis(f64::INFINITY), i32::MAX);
        assert_eq!(scale_axis(-1e12), i32::MIN);
    }

    #[test]
    fn test_rc_command_channel_order() {
        let twist = Twist {
            linear: Vector3::new(0.5, -0.25, 0.011),
            angular: Vector3::new(9.0, 9.0, -0.999),
        };
        assert_eq!(
            rc_command(&twist),
            RcCommand {
                left_right: 50,
                forward_back: -25,
                up_down: 1,
                yaw: -99,
            }
        );
    }

    #[test]
    fn test_static_transform_is_identity() {
        let msg = static_transform("world", "tello_base_link", stamp());
        assert_eq!(msg.header.frame_id, "world");
        assert_eq!(msg.child_frame_id, "tello_base_link");
        assert_eq!(msg.transform.translation, Vector3::default());
        assert_eq!(msg.transform.rotation, Quaternion::identity());
    }
}
