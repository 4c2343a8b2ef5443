//! Commands sent from the receiver to a device.

use bytes::BufMut;

use crate::constants::*;

/// Command type byte of a request data page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestCommandType {
    /// Request a single data page.
    DataPage,
    /// Request a data page set (identification pages 1 and 2).
    PageSet,
}

impl RequestCommandType {
    pub fn code(&self) -> u8 {
        match self {
            RequestCommandType::DataPage => REQUEST_COMMAND_DATA_PAGE,
            RequestCommandType::PageSet => REQUEST_COMMAND_PAGE_SET,
        }
    }
}

/// Common page 70: ask a device to transmit one of its pages.
///
/// Layout: `[0x46, 0xFF, 0xFF, descriptor 1, descriptor 2, transmit count,
/// requested page, command type]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDataPage {
    pub requested_page: u8,
    pub command_type: RequestCommandType,
    /// Number of times the device should transmit the page.
    pub transmit_count: u8,
    pub descriptor: [u8; 2],
}

impl RequestDataPage {
    /// Request a single page, transmitted once.
    pub fn single(page: u8) -> Self {
        RequestDataPage {
            requested_page: page,
            command_type: RequestCommandType::DataPage,
            transmit_count: REQUEST_TRANSMIT_ONCE,
            descriptor: [REQUEST_DESCRIPTOR_NONE; 2],
        }
    }

    /// Request a page set starting at `page`, transmitted once.
    pub fn page_set(page: u8) -> Self {
        RequestDataPage {
            command_type: RequestCommandType::PageSet,
            ..Self::single(page)
        }
    }

    /// Encode into an 8-byte payload.
    pub fn encode(&self) -> [u8; PAYLOAD_SIZE] {
        let mut out = [0u8; PAYLOAD_SIZE];
        let mut buf = &mut out[..];
        buf.put_u8(PAGE_REQUEST);
        buf.put_u8(REQUEST_RESERVED);
        buf.put_u8(REQUEST_RESERVED);
        buf.put_slice(&self.descriptor);
        buf.put_u8(self.transmit_count);
        buf.put_u8(self.requested_page);
        buf.put_u8(self.command_type.code());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_page_request_bytes() {
        assert_eq!(
            RequestDataPage::single(PAGE_BATTERY_STATUS).encode(),
            [0x46, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x52, 0x01]
        );
    }

    #[test]
    fn test_page_set_request_bytes() {
        assert_eq!(
            RequestDataPage::page_set(PAGE_IDENTIFICATION_1).encode(),
            [0x46, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x10, 0x04]
        );
    }
}
