use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rpihw::{ByteOrder, HwError, I2cBus, MockI2cDevice, Transfer, TransferFault};

const SENSOR: u16 = 0x48;

fn setup() -> (I2cBus, MockI2cDevice) {
    let device = MockI2cDevice::new();
    device.attach(SENSOR);
    let bus = I2cBus::with_device("mock-i2c", Box::new(device.clone()));
    (bus, device)
}

#[test]
fn write_register_frames_address_then_value_msb_first() {
    let (bus, device) = setup();

    let mut tx = bus.begin_transaction(SENSOR).unwrap();
    tx.write_register(0x10, 0xbeefu16, ByteOrder::MsbFirst).unwrap();
    tx.write_register(0x20, 0xbeefu16, ByteOrder::LsbFirst).unwrap();
    drop(tx);

    assert_eq!(device.registers(SENSOR, 0x10, 2), vec![0xbe, 0xef]);
    assert_eq!(device.registers(SENSOR, 0x20, 2), vec![0xef, 0xbe]);
    assert_eq!(
        device.transfers(),
        vec![
            Transfer::Select(SENSOR),
            Transfer::Write {
                address: SENSOR,
                bytes: vec![0x10, 0xbe, 0xef],
            },
            Transfer::Write {
                address: SENSOR,
                bytes: vec![0x20, 0xef, 0xbe],
            },
        ]
    );
}

#[test]
fn read_register_assembles_first_wire_byte_as_most_significant() {
    let (bus, device) = setup();
    device.set_registers(SENSOR, 0x00, &[0x12, 0x34, 0x56, 0x78]);

    let mut tx = bus.begin_transaction(SENSOR).unwrap();
    assert_eq!(
        tx.read_register::<u32>(0x00, ByteOrder::MsbFirst).unwrap(),
        0x1234_5678
    );
    assert_eq!(
        tx.read_register::<u32>(0x00, ByteOrder::from_invert(true))
            .unwrap(),
        0x7856_3412
    );
    assert_eq!(tx.read_register::<i8>(0x01, ByteOrder::MsbFirst).unwrap(), 0x34);
    assert_eq!(tx.read_register_bytes::<3>(0x01).unwrap(), [0x34, 0x56, 0x78]);
}

#[test]
fn register_round_trip_over_the_bus() {
    let (bus, _) = setup();
    let mut tx = bus.begin_transaction(SENSOR).unwrap();

    for order in [ByteOrder::MsbFirst, ByteOrder::LsbFirst] {
        tx.write_register(0x40, -2_000_000_000i64, order).unwrap();
        assert_eq!(
            tx.read_register::<i64>(0x40, order).unwrap(),
            -2_000_000_000
        );
        tx.write_register(0x50, 0x0bad_cafeu32, order).unwrap();
        assert_eq!(tx.read_register::<u32>(0x50, order).unwrap(), 0x0bad_cafe);
    }
}

#[test]
fn register_access_after_transaction_end_is_rejected() {
    let (bus, device) = setup();

    let mut tx = bus.begin_transaction(SENSOR).unwrap();
    tx.end();
    assert!(!tx.is_active());

    assert!(matches!(
        tx.read_register::<u8>(0x00, ByteOrder::MsbFirst),
        Err(HwError::I2cOutOfTransaction)
    ));
    assert!(matches!(
        tx.write_register(0x00, 1u8, ByteOrder::MsbFirst),
        Err(HwError::I2cOutOfTransaction)
    ));
    assert_eq!(device.transfers(), vec![Transfer::Select(SENSOR)]);

    // the bus was handed back by end(), not by drop
    let other = bus.begin_transaction(SENSOR).unwrap();
    assert!(other.is_active());
}

#[test]
fn failed_select_leaves_the_bus_unlocked() {
    let (bus, device) = setup();
    device.mark_busy(0x50);

    match bus.begin_transaction(0x50) {
        Err(HwError::I2cDeviceConnection { address, .. }) => assert_eq!(address, 0x50),
        other => panic!("expected connection failure, got {:?}", other.err()),
    }

    let tx = bus.begin_transaction(SENSOR).unwrap();
    assert_eq!(tx.address(), SENSOR);
}

#[test]
fn ten_bit_addresses_are_rejected() {
    let (bus, device) = setup();

    assert!(matches!(
        bus.begin_transaction(0x80),
        Err(HwError::I2cInvalidAddress { address: 0x80 })
    ));
    assert!(device.transfers().is_empty());
}

#[test]
fn short_read_is_a_hard_failure() {
    let (bus, device) = setup();
    device.limit_transfers(Some(2));

    let mut tx = bus.begin_transaction(SENSOR).unwrap();
    match tx.read_register::<u32>(0x07, ByteOrder::MsbFirst) {
        Err(HwError::I2cReadRegister {
            address,
            register,
            fault: TransferFault::Short { expected, actual },
        }) => {
            assert_eq!((address, register), (SENSOR, 0x07));
            assert_eq!((expected, actual), (4, 2));
        }
        other => panic!("expected short read, got {other:?}"),
    }
}

#[test]
fn short_write_reports_the_attempted_value() {
    let (bus, device) = setup();
    device.limit_transfers(Some(2));

    let mut tx = bus.begin_transaction(SENSOR).unwrap();
    let err = tx
        .write_register(0x03, 0x1234_5678u32, ByteOrder::MsbFirst)
        .unwrap_err();
    match &err {
        HwError::I2cWriteRegister {
            register,
            value,
            fault: TransferFault::Short { expected, actual },
            ..
        } => {
            assert_eq!(*register, 0x03);
            assert_eq!(*value, 0x1234_5678);
            assert_eq!((*expected, *actual), (5, 2));
        }
        other => panic!("expected short write, got {other:?}"),
    }
    assert!(err.to_string().contains("305419896"));
}

#[test]
fn absent_device_surfaces_the_os_error() {
    let (bus, _) = setup();

    let mut tx = bus.begin_transaction(0x22).unwrap();
    assert!(matches!(
        tx.read_register::<u8>(0x00, ByteOrder::MsbFirst),
        Err(HwError::I2cReadRegister {
            address: 0x22,
            fault: TransferFault::Os(_),
            ..
        })
    ));
}

#[test]
fn concurrent_transactions_never_interleave() {
    let device = MockI2cDevice::new();
    device.attach(0x10).attach(0x20);
    let bus = Arc::new(I2cBus::with_device("mock-i2c", Box::new(device.clone())));
    let start = Arc::new(Barrier::new(2));

    let workers: Vec<_> = [0x10u16, 0x20]
        .into_iter()
        .map(|address| {
            let bus = bus.clone();
            let start = start.clone();
            thread::spawn(move || {
                start.wait();
                let mut tx = bus.begin_transaction(address).unwrap();
                for register in 0..4u8 {
                    tx.write_register(register, u16::from(register), ByteOrder::MsbFirst)
                        .unwrap();
                    thread::sleep(Duration::from_millis(5));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let log = device.transfers();
    assert_eq!(log.len(), 10);

    // each transaction is one select followed by its own writes, back to back
    for chunk in log.chunks(5) {
        let Transfer::Select(selected) = chunk[0] else {
            panic!("transaction did not start with a select: {chunk:?}");
        };
        for transfer in &chunk[1..] {
            match transfer {
                Transfer::Write { address, .. } => assert_eq!(*address, selected),
                other => panic!("unexpected transfer {other:?}"),
            }
        }
    }
    assert_ne!(log[0], log[5]);
}

#[cfg(feature = "hardware")]
#[test]
fn shared_bus_open_failure_is_reported_and_not_cached() {
    use std::path::Path;

    let config = rpihw::I2cConfig {
        device: Some("/nonexistent/i2c-9".into()),
        ..rpihw::I2cConfig::default()
    };

    // a failed open leaves the slot empty, so the second call tries again
    for _ in 0..2 {
        match I2cBus::shared_with(&config) {
            Err(HwError::I2cBusOpen { path, source }) => {
                assert_eq!(path, Path::new("/nonexistent/i2c-9"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected bus open failure, got {:?}", other.err()),
        }
    }
}
