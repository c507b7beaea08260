use crate::device::types::DeviceAddress;

/// The link to the peripheral. Every operation is fire-and-forget: the outcome is reported later
/// as a `TransportEvent` on the channel the transport was constructed with.
pub trait Transport: Send {
    /// Look for a candidate device; answered by `TransportEvent::DeviceSetFound`.
    fn discover(&mut self);

    /// Answered by `ConnectionStateChanged(Connected)` or `ConnectionStateChanged(Disconnected)`.
    fn connect(&mut self, address: &DeviceAddress);

    /// Answered by `ConnectionStateChanged(Disconnected)`.
    fn disconnect(&mut self);

    fn send(&mut self, bytes: Vec<u8>);
}
