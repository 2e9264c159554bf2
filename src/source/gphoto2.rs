//! libgphoto2 preview source.
//!
//! Drives the first auto-detected camera through libgphoto2's C API. The SDK owns the
//! preview buffer: `gp_file_get_data_and_size` exposes bytes that live inside the
//! `CameraFile` until the next capture into it, which is exactly the lifetime
//! `PreviewSource::preview` borrows for.
//!
//! Every SDK call goes through `sdk_check!`, so failures carry the call text and site.

use anyhow::{anyhow, Result};
use libgphoto2_sys as gp;
use std::os::raw::{c_char, c_ulong};
use std::ptr;

use super::{CameraConfig, PreviewSource};
use crate::frame::CompressedFrame;
use crate::sdk_check;

pub struct Gphoto2Source {
    config: CameraConfig,
    context: *mut gp::GPContext,
    camera: *mut gp::Camera,
    file: *mut gp::CameraFile,
    data: *const c_char,
    size: c_ulong,
    frame_count: u64,
}

impl Gphoto2Source {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            context: ptr::null_mut(),
            camera: ptr::null_mut(),
            file: ptr::null_mut(),
            data: ptr::null(),
            size: 0,
            frame_count: 0,
        }
    }

    fn is_connected(&self) -> bool {
        !self.file.is_null()
    }

    fn open_handles(&mut self) -> Result<()> {
        // SAFETY: gp_context_new has no preconditions; null means allocation failure.
        let context = unsafe { gp::gp_context_new() };
        if context.is_null() {
            return Err(anyhow!("gp_context_new returned no context"));
        }
        self.context = context;

        // SAFETY: the out-pointer is a field of self and context is live.
        sdk_check!(unsafe { gp::gp_camera_new(&mut self.camera) })?;
        // SAFETY: camera was just allocated by gp_camera_new.
        sdk_check!(unsafe { gp::gp_camera_init(self.camera, self.context) })?;
        // SAFETY: the out-pointer is a field of self.
        sdk_check!(unsafe { gp::gp_file_new(&mut self.file) })?;
        Ok(())
    }
}

impl PreviewSource for Gphoto2Source {
    fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        // Handles left over from an attempt that failed partway.
        self.close()?;

        if let Err(err) = self.open_handles() {
            if let Err(release_err) = self.close() {
                log::warn!("Gphoto2Source: release after failed connect: {}", release_err);
            }
            return Err(err);
        }

        log::info!("Gphoto2Source: connected to {}", self.config.uri);
        Ok(())
    }

    fn fetch_preview(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Err(anyhow!("gphoto2 camera not connected; call connect() first"));
        }

        // The previous buffer belongs to `file` and is about to be overwritten.
        self.data = ptr::null();
        self.size = 0;

        let mut data: *const c_char = ptr::null();
        let mut size: c_ulong = 0;
        // SAFETY: camera, file and context were initialised by connect().
        sdk_check!(unsafe {
            gp::gp_camera_capture_preview(self.camera, self.file, self.context)
        })?;
        // SAFETY: file holds the preview just captured; out-pointers are locals.
        sdk_check!(unsafe { gp::gp_file_get_data_and_size(self.file, &mut data, &mut size) })?;

        self.data = data;
        self.size = size;
        self.frame_count += 1;
        log::trace!(
            "Gphoto2Source: preview #{} ({} bytes)",
            self.frame_count,
            size
        );
        Ok(())
    }

    fn preview(&self) -> CompressedFrame<'_> {
        if self.data.is_null() || self.size == 0 {
            return CompressedFrame::new(&[]);
        }
        // SAFETY: data/size come from gp_file_get_data_and_size and stay valid until the
        // next capture into `file`, which needs `&mut self` and so ends this borrow first.
        let bytes =
            unsafe { std::slice::from_raw_parts(self.data.cast::<u8>(), self.size as usize) };
        CompressedFrame::new(bytes)
    }

    fn close(&mut self) -> Result<()> {
        self.data = ptr::null();
        self.size = 0;

        let mut first_err = None;
        if !self.file.is_null() {
            // SAFETY: file was allocated by gp_file_new and is released exactly once.
            if let Err(err) = sdk_check!(unsafe { gp::gp_file_free(self.file) }) {
                first_err.get_or_insert(err);
            }
            self.file = ptr::null_mut();
        }
        if !self.camera.is_null() {
            // SAFETY: camera was allocated by gp_camera_new and is released exactly once.
            if let Err(err) =
                sdk_check!(unsafe { gp::gp_camera_exit(self.camera, self.context) })
            {
                first_err.get_or_insert(err);
            }
            // SAFETY: camera is still allocated; this drops the last reference.
            if let Err(err) = sdk_check!(unsafe { gp::gp_camera_unref(self.camera) }) {
                first_err.get_or_insert(err);
            }
            self.camera = ptr::null_mut();
        }
        if !self.context.is_null() {
            // SAFETY: context came from gp_context_new and is unreferenced exactly once.
            unsafe { gp::gp_context_unref(self.context) };
            self.context = ptr::null_mut();
            log::info!(
                "Gphoto2Source: released {} after {} previews",
                self.config.uri,
                self.frame_count
            );
        }

        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn describe(&self) -> String {
        format!("{} (gphoto2)", self.config.uri)
    }
}

impl Drop for Gphoto2Source {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("Gphoto2Source: release on drop failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handles_released(source: &Gphoto2Source) -> bool {
        source.context.is_null() && source.camera.is_null() && source.file.is_null()
    }

    #[test]
    fn failed_connect_releases_partial_handles() -> Result<()> {
        let mut source = Gphoto2Source::new(CameraConfig {
            uri: "gphoto2://".to_string(),
            ..CameraConfig::default()
        });
        // Without a tethered camera gp_camera_init fails after context and camera exist.
        for _ in 0..2 {
            match source.connect() {
                Ok(()) => return source.close(),
                Err(_) => assert!(handles_released(&source)),
            }
        }
        Ok(())
    }

    #[test]
    fn close_before_connect_is_a_no_op() -> Result<()> {
        let mut source = Gphoto2Source::new(CameraConfig::default());
        source.close()?;
        assert!(handles_released(&source));
        assert!(source.preview().is_empty());
        Ok(())
    }
}
