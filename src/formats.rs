//! Format dispatch: routes a decoded file's chunks to the
//! handler registered for its [`FileKind`].

use crate::error::Result;
use crate::manifest::FileKind;
use serde_json::Value;

/// One handler per recognized kind; `handle_other` covers everything else.
/// Handlers receive raw word-aligned bytes, not parsed packet views —
/// decoding into typed records is out of scope. A handler may return a
/// payload to publish as a `Message::UserMessage`; `None` publishes nothing.
pub struct Switch<'a> {
    pub handle_dvs: &'a mut dyn FnMut(&[u8]) -> Result<Option<Value>>,
    pub handle_aps: &'a mut dyn FnMut(&[u8], u32, u32) -> Result<Option<Value>>,
    pub handle_imu: &'a mut dyn FnMut(&[u8]) -> Result<Option<Value>>,
    pub handle_other: &'a mut dyn FnMut(&[u8]) -> Result<Option<Value>>,
}

impl<'a> Switch<'a> {
    pub fn dispatch(&mut self, kind: FileKind, chunk: &[u8]) -> Result<Option<Value>> {
        match kind {
            FileKind::Dvs => (self.handle_dvs)(chunk),
            FileKind::Aps { width, height } => (self.handle_aps)(chunk, width, height),
            FileKind::Imu => (self.handle_imu)(chunk),
            FileKind::Other => (self.handle_other)(chunk),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_to_matching_handler() {
        let mut dvs_calls = 0;
        let mut aps_calls = 0;
        let mut imu_calls = 0;
        let mut other_calls = 0;
        let mut handle_dvs = |_: &[u8]| {
            dvs_calls += 1;
            Ok(None)
        };
        let mut handle_aps = |_: &[u8], _w: u32, _h: u32| {
            aps_calls += 1;
            Ok(None)
        };
        let mut handle_imu = |_: &[u8]| {
            imu_calls += 1;
            Ok(None)
        };
        let mut handle_other = |_: &[u8]| {
            other_calls += 1;
            Ok(None)
        };
        let mut switch = Switch {
            handle_dvs: &mut handle_dvs,
            handle_aps: &mut handle_aps,
            handle_imu: &mut handle_imu,
            handle_other: &mut handle_other,
        };
        switch.dispatch(FileKind::Dvs, &[]).unwrap();
        switch.dispatch(FileKind::Aps { width: 2, height: 2 }, &[]).unwrap();
        switch.dispatch(FileKind::Imu, &[]).unwrap();
        switch.dispatch(FileKind::Other, &[]).unwrap();
        drop(switch);
        assert_eq!((dvs_calls, aps_calls, imu_calls, other_calls), (1, 1, 1, 1));
    }
}
