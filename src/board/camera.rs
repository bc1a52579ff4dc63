use core::ptr::NonNull;

use esp_idf_svc::sys::camera;
use esp_idf_svc::sys::{esp, EspError};

use crate::upload::FrameSource;

/// 摄像头引脚（DVP 接口，OV2640）。
pub struct CameraPins {
    pub pwdn: i32,
    pub reset: i32,
    pub xclk: i32,
    pub sda: i32,
    pub scl: i32,
    pub data: [i32; 8],
    pub vsync: i32,
    pub href: i32,
    pub pclk: i32,
}

impl CameraPins {
    /// ESP32-S3 WROOM CAM 开发板。
    pub const S3_WROOM_CAM: CameraPins = CameraPins {
        pwdn: -1,
        reset: -1,
        xclk: 15,
        sda: 4,
        scl: 5,
        data: [11, 9, 8, 10, 12, 18, 17, 16],
        vsync: 6,
        href: 7,
        pclk: 13,
    };
}

#[derive(Debug)]
pub enum CameraError {
    Init(EspError),
    NoFrame,
}

/// JPEG 抓拍（esp32-camera 驱动）。
pub struct Camera {
    _private: (),
}

impl Camera {
    /// 初始化传感器：JPEG、VGA、单帧缓冲（PSRAM）。
    pub fn new(pins: &CameraPins) -> Result<Self, CameraError> {
        let config = camera::camera_config_t {
            pin_pwdn: pins.pwdn,
            pin_reset: pins.reset,
            pin_xclk: pins.xclk,
            __bindgen_anon_1: camera::camera_config_t__bindgen_ty_1 {
                pin_sccb_sda: pins.sda,
            },
            __bindgen_anon_2: camera::camera_config_t__bindgen_ty_2 {
                pin_sccb_scl: pins.scl,
            },
            pin_d0: pins.data[0],
            pin_d1: pins.data[1],
            pin_d2: pins.data[2],
            pin_d3: pins.data[3],
            pin_d4: pins.data[4],
            pin_d5: pins.data[5],
            pin_d6: pins.data[6],
            pin_d7: pins.data[7],
            pin_vsync: pins.vsync,
            pin_href: pins.href,
            pin_pclk: pins.pclk,
            xclk_freq_hz: 20_000_000,
            ledc_timer: esp_idf_svc::sys::ledc_timer_t_LEDC_TIMER_0,
            ledc_channel: esp_idf_svc::sys::ledc_channel_t_LEDC_CHANNEL_0,
            pixel_format: camera::pixformat_t_PIXFORMAT_JPEG,
            frame_size: camera::framesize_t_FRAMESIZE_VGA,
            jpeg_quality: 12,
            fb_count: 1,
            fb_location: camera::camera_fb_location_t_CAMERA_FB_IN_PSRAM,
            grab_mode: camera::camera_grab_mode_t_CAMERA_GRAB_WHEN_EMPTY,
            ..Default::default()
        };
        esp!(unsafe { camera::esp_camera_init(&config) }).map_err(CameraError::Init)?;
        log::info!("Camera initialized");
        Ok(Self { _private: () })
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        unsafe {
            camera::esp_camera_deinit();
        }
    }
}

impl FrameSource for Camera {
    type Frame = CameraFrame;
    type Error = CameraError;

    fn capture(&mut self) -> Result<Self::Frame, Self::Error> {
        let fb = unsafe { camera::esp_camera_fb_get() };
        NonNull::new(fb)
            .map(|fb| CameraFrame { fb })
            .ok_or(CameraError::NoFrame)
    }
}

/// 驱动帧缓冲区；drop 时归还给驱动。
pub struct CameraFrame {
    fb: NonNull<camera::camera_fb_t>,
}

impl AsRef<[u8]> for CameraFrame {
    fn as_ref(&self) -> &[u8] {
        // 驱动保证 buf/len 在归还前有效
        unsafe {
            let fb = self.fb.as_ref();
            if fb.buf.is_null() {
                return &[];
            }
            core::slice::from_raw_parts(fb.buf, fb.len)
        }
    }
}

impl Drop for CameraFrame {
    fn drop(&mut self) {
        unsafe {
            camera::esp_camera_fb_return(self.fb.as_ptr());
        }
    }
}
