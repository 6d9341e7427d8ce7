//! Endpoint scanning
//!
//! Flattens a device's interface descriptors into the endpoint references
//! the reader and writer iterate over.

use protocol::{DeviceInfo, EndpointRef};

/// Enumerate every endpoint of every interface, in descriptor order
pub fn scan(device: &DeviceInfo) -> Vec<EndpointRef> {
    device
        .interfaces
        .iter()
        .enumerate()
        .flat_map(|(interface_index, interface)| {
            interface
                .endpoints
                .iter()
                .enumerate()
                .map(move |(endpoint_index, endpoint)| EndpointRef {
                    interface_index,
                    endpoint_index,
                    interface_number: interface.number,
                    address: endpoint.address,
                    direction: endpoint.direction,
                    kind: endpoint.kind,
                    max_packet_size: endpoint.max_packet_size,
                })
        })
        .collect()
}

/// Device-to-host endpoints
pub fn inputs(endpoints: &[EndpointRef]) -> Vec<EndpointRef> {
    endpoints.iter().filter(|e| e.is_in()).copied().collect()
}

/// Host-to-device endpoints
pub fn outputs(endpoints: &[EndpointRef]) -> Vec<EndpointRef> {
    endpoints.iter().filter(|e| e.is_out()).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{create_mock_device_info, create_mock_endpoint};
    use protocol::{Direction, EndpointKind, InterfaceInfo};

    #[test]
    fn test_scan_orders_interfaces_then_endpoints() {
        let device = create_mock_device_info(
            2,
            0x1234,
            0x5678,
            vec![
                InterfaceInfo {
                    number: 0,
                    class: 3,
                    endpoints: vec![
                        create_mock_endpoint(0x81, EndpointKind::Interrupt, 64),
                        create_mock_endpoint(0x01, EndpointKind::Interrupt, 32),
                    ],
                },
                InterfaceInfo {
                    number: 1,
                    class: 0xff,
                    endpoints: vec![create_mock_endpoint(0x82, EndpointKind::Bulk, 512)],
                },
            ],
        );

        let endpoints = scan(&device);
        assert_eq!(endpoints.len(), 3);

        assert_eq!(endpoints[0].address, 0x81);
        assert_eq!(endpoints[0].interface_index, 0);
        assert_eq!(endpoints[0].endpoint_index, 0);
        assert_eq!(endpoints[0].direction, Direction::In);

        assert_eq!(endpoints[1].address, 0x01);
        assert_eq!(endpoints[1].endpoint_index, 1);
        assert_eq!(endpoints[1].max_packet_size, 32);

        assert_eq!(endpoints[2].interface_index, 1);
        assert_eq!(endpoints[2].interface_number, 1);
        assert_eq!(endpoints[2].kind, EndpointKind::Bulk);

        let ins: Vec<u8> = inputs(&endpoints).iter().map(|e| e.address).collect();
        let outs: Vec<u8> = outputs(&endpoints).iter().map(|e| e.address).collect();
        assert_eq!(ins, vec![0x81, 0x82]);
        assert_eq!(outs, vec![0x01]);
    }

    #[test]
    fn test_scan_without_endpoints() {
        let device = create_mock_device_info(
            3,
            0x1234,
            0x5678,
            vec![InterfaceInfo {
                number: 0,
                class: 3,
                endpoints: Vec::new(),
            }],
        );
        assert!(scan(&device).is_empty());

        let bare = create_mock_device_info(4, 0x1234, 0x5678, Vec::new());
        assert!(scan(&bare).is_empty());
    }
}
