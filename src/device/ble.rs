use futures::StreamExt;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use btleplug::api::{Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use crate::config::types::Config;
use crate::device::constants::{IS_CONNECTED_DEADLINE, POLL_DELAY, SCAN_WINDOW, WRITE_DEADLINE};
use crate::device::transport::Transport;
use crate::device::types::{ConnectionState, DeviceAddress, RawEvent, TransportEvent};
use crate::error::DeviceError;

#[derive(Debug, Clone)]
pub struct BleSettings {
    pub service_uuid: Uuid,
    pub write_characteristic_uuid: Uuid,
    pub write_chunk_size: usize,
}

impl From<&Config> for BleSettings {
    fn from(config: &Config) -> Self {
        BleSettings {
            service_uuid: config.service_uuid,
            write_characteristic_uuid: config.write_characteristic_uuid,
            write_chunk_size: config.write_chunk_size.max(1),
        }
    }
}

#[derive(Debug)]
enum LinkCommand {
    Discover,
    Connect(DeviceAddress),
    Disconnect,
    Send(Vec<u8>),
}

struct Link {
    peripheral: Peripheral,
    write_char: Characteristic,
    notifications_cancel: CancellationToken,
    notifications: Option<JoinHandle<Result<(), DeviceError>>>,
}

/// `Transport` over Bluetooth LE. Commands are queued to a link task that performs them one at a
/// time, which keeps frames in the order they were sent.
pub struct BleTransport {
    commands: UnboundedSender<LinkCommand>,
}

impl BleTransport {
    pub fn spawn(
        cancel: CancellationToken,
        settings: BleSettings,
        events: UnboundedSender<TransportEvent>,
    ) -> (BleTransport, JoinHandle<()>) {
        let (commands, command_receiver) = unbounded::<LinkCommand>();
        let handle = spawn(link_task(cancel, settings, command_receiver, events));
        (BleTransport { commands }, handle)
    }

    fn command(&self, command: LinkCommand) {
        if let Err(err) = self.commands.unbounded_send(command) {
            warn!("Bluetooth link task is gone, dropping {:?}", err.into_inner());
        }
    }
}

impl Transport for BleTransport {
    fn discover(&mut self) {
        self.command(LinkCommand::Discover);
    }

    fn connect(&mut self, address: &DeviceAddress) {
        self.command(LinkCommand::Connect(address.clone()));
    }

    fn disconnect(&mut self) {
        self.command(LinkCommand::Disconnect);
    }

    fn send(&mut self, bytes: Vec<u8>) {
        self.command(LinkCommand::Send(bytes));
    }
}

fn emit(events: &UnboundedSender<TransportEvent>, event: TransportEvent) {
    if events.unbounded_send(event).is_err() {
        debug!("Nobody is listening for transport events");
    }
}

async fn get_adapters(manager: &Manager, cached: &mut Option<Vec<Adapter>>) -> Result<Vec<Adapter>, DeviceError> {
    if let Some(adapters) = cached {
        return Ok(adapters.clone());
    }

    let adapters = manager.adapters().await?;
    if adapters.is_empty() {
        return Err(DeviceError::NoAdapter);
    }

    *cached = Some(adapters.clone());
    Ok(adapters)
}

async fn scan(adapters: &[Adapter], service_uuid: Uuid) -> Result<(), DeviceError> {
    let filter = ScanFilter {
        services: vec![service_uuid],
    };

    for adapter in adapters {
        info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        adapter.start_scan(filter.clone()).await?;
    }

    sleep(Duration::from_millis(SCAN_WINDOW)).await;

    for adapter in adapters {
        if let Err(err) = adapter.stop_scan().await {
            warn!("Failed to stop scanning: {:?}", err);
        }
    }

    Ok(())
}

// returns the first peripheral accepted by `matches`
async fn find_peripheral<F>(adapters: &[Adapter], matches: F) -> Option<(Peripheral, DeviceAddress)>
where
    F: Fn(&DeviceAddress, &[Uuid]) -> bool,
{
    for adapter in adapters {
        let peripherals = match adapter.peripherals().await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to query BLE adapter for peripherals: {}", err);
                continue;
            },
        };

        for peripheral in peripherals {
            match peripheral.properties().await {
                Err(err) => {
                    warn!("Could not query peripheral for properties: {:?}", err);
                },
                Ok(None) => {
                    warn!("Peripheral has no properties");
                },
                Ok(Some(properties)) => {
                    let address = DeviceAddress::new(properties.address.to_string());
                    if matches(&address, &properties.services) {
                        info!(
                            "Using peripheral {} {}",
                            address,
                            properties.local_name.unwrap_or(String::from("NONE")),
                        );
                        return Some((peripheral, address));
                    }
                },
            }
        }
    }

    None
}

async fn discover(manager: &Manager, adapters: &mut Option<Vec<Adapter>>, settings: &BleSettings) -> Result<Option<DeviceAddress>, DeviceError> {
    let adapters = get_adapters(manager, adapters).await?;
    scan(&adapters, settings.service_uuid).await?;

    // Some environments ignore the filter, so make sure to check the service uuid again
    let found = find_peripheral(&adapters, |_, services| services.contains(&settings.service_uuid)).await;
    Ok(found.map(|(_, address)| address))
}

async fn connect_peripheral(peripheral: &Peripheral, settings: &BleSettings) -> Result<Characteristic, DeviceError> {
    info!("Connecting to peripheral...");
    peripheral.connect().await?;

    info!("Connected; Discovering services...");
    peripheral.discover_services().await?;

    let mut write_char = None;
    for service in peripheral.services() {
        if !service.uuid.eq(&settings.service_uuid) {
            continue;
        }

        for characteristic in &service.characteristics {
            if characteristic.uuid.eq(&settings.write_characteristic_uuid) {
                write_char = Some(characteristic.clone());
            }
            else if characteristic.properties.contains(CharPropFlags::NOTIFY) {
                info!("Subscribing to characteristic {:?} {:?}", service.uuid, characteristic.uuid);
                if let Err(err) = peripheral.subscribe(characteristic).await {
                    warn!("Failed to subscribe to {:?}: {:?}", characteristic.uuid, err);
                }
            }
        }
    }

    write_char.ok_or(DeviceError::MissingCharacteristic)
}

async fn connect(manager: &Manager, adapters: &mut Option<Vec<Adapter>>, settings: &BleSettings, address: &DeviceAddress) -> Result<(Peripheral, Characteristic), DeviceError> {
    let adapters = get_adapters(manager, adapters).await?;
    let same_address = |candidate: &DeviceAddress, _: &[Uuid]| candidate.as_str().eq_ignore_ascii_case(address.as_str());

    let mut found = find_peripheral(&adapters, same_address).await;
    if found.is_none() {
        // the adapter only knows peripherals it has seen advertising
        scan(&adapters, settings.service_uuid).await?;
        found = find_peripheral(&adapters, same_address).await;
    }

    let (peripheral, _) = found.ok_or_else(|| DeviceError::PeripheralNotFound { address: address.clone() })?;
    let write_char = connect_peripheral(&peripheral, settings).await?;
    Ok((peripheral, write_char))
}

fn write_type(characteristic: &Characteristic) -> WriteType {
    if characteristic.properties.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE) {
        WriteType::WithoutResponse
    } else {
        WriteType::WithResponse
    }
}

async fn write_frame(link: &Link, bytes: &[u8], chunk_size: usize) -> Result<(), DeviceError> {
    let write_type = write_type(&link.write_char);

    for chunk in bytes.chunks(chunk_size) {
        tokio::select! {
            _ = sleep(Duration::from_millis(WRITE_DEADLINE)) => {
                return Err(DeviceError::WriteTimeout);
            }
            result = link.peripheral.write(&link.write_char, chunk, write_type) => {
                result?;
            }
        }
    }

    Ok(())
}

async fn is_still_connected(peripheral: &Peripheral) -> bool {
    tokio::select! {
        _ = sleep(Duration::from_millis(IS_CONNECTED_DEADLINE)) => {
            warn!("Checking for connection status took too long");
            false
        }
        result = peripheral.is_connected() => match result {
            Err(err) => {
                warn!("Error checking for connection state: {:?}", err);
                false
            },
            Ok(connected) => connected,
        }
    }
}

fn read_notifications_task(cancel: CancellationToken, peripheral: &Peripheral, events: UnboundedSender<TransportEvent>) -> JoinHandle<Result<(), DeviceError>> {
    let peripheral_clone = peripheral.clone();

    spawn(async move {
        let mut notification_stream = peripheral_clone.notifications().await?;

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                data = notification_stream.next() => match data {
                    Some(data) => emit(&events, TransportEvent::Unrelated(RawEvent {
                        kind: format!("notification {}", data.uuid),
                        payload: Some(data.value),
                    })),
                    None => break 'mainloop,
                },
            }
        }

        Ok(())
    })
}

async fn close_link(mut link: Link, disconnect: bool) {
    link.notifications_cancel.cancel();
    if let Some(handle) = link.notifications.take() {
        match handle.await {
            Ok(Ok(())) => {},
            Ok(Err(err)) => warn!("Error during read notifications task: {:?}", err),
            Err(err) => warn!("Failed to join read notifications task: {:?}", err),
        }
    }

    if disconnect {
        if let Err(err) = link.peripheral.disconnect().await {
            warn!("Failed to disconnect peripheral: {:?}", err);
        }
    }
}

async fn link_task(
    cancel: CancellationToken,
    settings: BleSettings,
    mut commands: UnboundedReceiver<LinkCommand>,
    events: UnboundedSender<TransportEvent>,
) {
    let manager = match Manager::new().await {
        Ok(manager) => Some(manager),
        Err(err) => {
            warn!("Bluetooth is not available: {:?}", err);
            None
        },
    };
    let mut adapters: Option<Vec<Adapter>> = None;
    let mut link: Option<Link> = None;

    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            Some(command) = commands.next() => match command {
                LinkCommand::Discover => {
                    let found = match &manager {
                        None => None,
                        Some(manager) => discover(manager, &mut adapters, &settings).await.unwrap_or_else(|err| {
                            warn!("Discovery failed: {:?}", err);
                            None
                        }),
                    };
                    emit(&events, TransportEvent::DeviceSetFound(found));
                },
                LinkCommand::Connect(address) => {
                    if let Some(previous) = link.take() {
                        close_link(previous, true).await;
                    }

                    let result = match &manager {
                        None => Err(DeviceError::NoAdapter),
                        Some(manager) => connect(manager, &mut adapters, &settings, &address).await,
                    };

                    match result {
                        Ok((peripheral, write_char)) => {
                            let notifications_cancel = cancel.child_token();
                            let notifications = read_notifications_task(notifications_cancel.clone(), &peripheral, events.clone());
                            link = Some(Link { peripheral, write_char, notifications_cancel, notifications: Some(notifications) });
                            info!("Peripheral ready");
                            emit(&events, TransportEvent::ConnectionStateChanged(ConnectionState::Connected));
                        },
                        Err(err) => {
                            warn!("Connecting to peripheral failed: {:?}", err);
                            // a failed peripheral may have to be obtained again from a fresh adapter list
                            adapters = None;
                            emit(&events, TransportEvent::ConnectionStateChanged(ConnectionState::Disconnected));
                        },
                    }
                },
                LinkCommand::Disconnect => {
                    if let Some(current) = link.take() {
                        close_link(current, true).await;
                    }
                    emit(&events, TransportEvent::ConnectionStateChanged(ConnectionState::Disconnected));
                },
                LinkCommand::Send(bytes) => match &link {
                    Some(current) => {
                        debug!("Writing {} bytes", bytes.len());
                        if let Err(err) = write_frame(current, &bytes, settings.write_chunk_size).await {
                            warn!("Failed to send to write characteristic: {:?}", err);
                        }
                    },
                    None => warn!("Not connected, dropping {} bytes", bytes.len()),
                },
            },
            _ = sleep(Duration::from_millis(POLL_DELAY)), if link.is_some() => {
                let connected = match &link {
                    Some(current) => is_still_connected(&current.peripheral).await,
                    None => true,
                };

                if !connected {
                    warn!("Connection lost");
                    if let Some(current) = link.take() {
                        close_link(current, false).await;
                    }
                    emit(&events, TransportEvent::ConnectionStateChanged(ConnectionState::Disconnected));
                }
            },
        }
    }

    if let Some(current) = link.take() {
        info!("Closing bluetooth link");
        close_link(current, true).await;
    }
}
