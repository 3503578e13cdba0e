//! Measurement-set sink: an optional write target alongside the
//! default raw-file output, gated behind the `with_ms` feature exactly
//! as the reference gates `WITH_MS`.

/// Entry points a measurement-set backend must provide. The default
/// build uses [`NullMeasurementSet`]; enabling `with_ms` switches to
/// [`oskar::OskarMeasurementSet`], which links an external C library.
pub trait MeasurementSetSink {
    fn create(&mut self, file_name: &str, num_stations: usize, num_channels: usize, num_pols: usize);
    fn open(&mut self, file_name: &str) -> bool;
    fn set_phase_centre(&mut self, ra: f64, dec: f64);
    fn write_coords_d(&mut self, start_row: usize, num_baselines: usize, uu: &[f64], vv: &[f64], ww: &[f64]);
    fn write_vis_f(&mut self, start_row: usize, channel: usize, num_baselines: usize, vis: &[f32]);
    fn close(&mut self);
}

/// No measurement set is opened; every call is a no-op. Used whenever
/// the pipeline runs in raw-file-only mode.
#[derive(Default)]
pub struct NullMeasurementSet;

impl MeasurementSetSink for NullMeasurementSet {
    fn create(&mut self, _file_name: &str, _num_stations: usize, _num_channels: usize, _num_pols: usize) {}
    fn open(&mut self, _file_name: &str) -> bool {
        false
    }
    fn set_phase_centre(&mut self, _ra: f64, _dec: f64) {}
    fn write_coords_d(&mut self, _start_row: usize, _num_baselines: usize, _uu: &[f64], _vv: &[f64], _ww: &[f64]) {}
    fn write_vis_f(&mut self, _start_row: usize, _channel: usize, _num_baselines: usize, _vis: &[f32]) {}
    fn close(&mut self) {}
}

#[cfg(feature = "with_ms")]
pub mod oskar {
    //! FFI binding to the OSKAR measurement-set library. Linked only
    //! when the `with_ms` feature is enabled (see `build.rs`); the
    //! function signatures mirror `write_ms_access.h`.

    use super::MeasurementSetSink;
    use std::ffi::CString;
    use std::os::raw::{c_char, c_double, c_float, c_int, c_uint};

    #[repr(C)]
    pub struct OskarMsHandle {
        _private: [u8; 0],
    }

    #[allow(non_snake_case)]
    extern "C" {
        fn oskar_ms_create(
            file_name: *const c_char,
            app_name: *const c_char,
            num_stations: c_uint,
            num_channels: c_uint,
            num_pols: c_uint,
            ref_freq_hz: c_double,
            freq_inc_hz: c_double,
            write_autocorr: c_int,
            write_crosscorr: c_int,
        ) -> *mut OskarMsHandle;

        fn oskar_ms_open(file_name: *const c_char) -> *mut OskarMsHandle;

        fn oskar_ms_set_phase_centre(ms: *mut OskarMsHandle, ra_rad: c_double, dec_rad: c_double);

        fn oskar_ms_write_coords_d(
            ms: *mut OskarMsHandle,
            start_row: c_uint,
            num_baselines: c_uint,
            uu: *const c_double,
            vv: *const c_double,
            ww: *const c_double,
            exposure_sec: c_double,
            interval_sec: c_double,
            time_stamp: c_double,
        );

        fn oskar_ms_write_vis_f(
            ms: *mut OskarMsHandle,
            start_row: c_uint,
            channel: c_uint,
            num_pols: c_uint,
            num_baselines: c_uint,
            vis: *const c_float,
        );

        fn oskar_ms_close(ms: *mut OskarMsHandle);
    }

    pub struct OskarMeasurementSet {
        handle: *mut OskarMsHandle,
    }

    impl Default for OskarMeasurementSet {
        fn default() -> Self {
            Self { handle: std::ptr::null_mut() }
        }
    }

    // SAFETY: the OSKAR handle is only ever touched from the single
    // write thread that owns a given `OskarMeasurementSet`.
    unsafe impl Send for OskarMeasurementSet {}

    impl MeasurementSetSink for OskarMeasurementSet {
        fn create(&mut self, file_name: &str, num_stations: usize, num_channels: usize, num_pols: usize) {
            let name = CString::new(file_name).expect("file name contains a NUL byte");
            let app = CString::new("spead-vis-ingest").unwrap();
            self.handle = unsafe {
                oskar_ms_create(
                    name.as_ptr(),
                    app.as_ptr(),
                    num_stations as c_uint,
                    num_channels as c_uint,
                    num_pols as c_uint,
                    100e6,
                    100e3,
                    0,
                    1,
                )
            };
        }

        fn open(&mut self, file_name: &str) -> bool {
            let name = CString::new(file_name).expect("file name contains a NUL byte");
            self.handle = unsafe { oskar_ms_open(name.as_ptr()) };
            !self.handle.is_null()
        }

        fn set_phase_centre(&mut self, ra: f64, dec: f64) {
            unsafe { oskar_ms_set_phase_centre(self.handle, ra, dec) };
        }

        fn write_coords_d(&mut self, start_row: usize, num_baselines: usize, uu: &[f64], vv: &[f64], ww: &[f64]) {
            unsafe {
                oskar_ms_write_coords_d(
                    self.handle,
                    start_row as c_uint,
                    num_baselines as c_uint,
                    uu.as_ptr(),
                    vv.as_ptr(),
                    ww.as_ptr(),
                    1.0,
                    1.0,
                    0.0,
                );
            }
        }

        fn write_vis_f(&mut self, start_row: usize, channel: usize, num_baselines: usize, vis: &[f32]) {
            unsafe {
                oskar_ms_write_vis_f(
                    self.handle,
                    start_row as c_uint,
                    channel as c_uint,
                    4,
                    num_baselines as c_uint,
                    vis.as_ptr(),
                );
            }
        }

        fn close(&mut self) {
            if !self.handle.is_null() {
                unsafe { oskar_ms_close(self.handle) };
                self.handle = std::ptr::null_mut();
            }
        }
    }

    impl Drop for OskarMeasurementSet {
        fn drop(&mut self) {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_open_always_fails() {
        let mut sink = NullMeasurementSet;
        assert!(!sink.open("anything"));
    }
}
