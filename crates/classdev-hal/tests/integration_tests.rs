//! Integration tests against a fake device-class tree

use classdev_hal::mock::MockClassTree;
use classdev_hal::{
    Device, DeviceError, DeviceSpec, HalConfig, Query, Resolver, Scheduler, Trigger, classes,
    ports,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Test environment with a brick's worth of devices
struct BrickTestEnv {
    temp_dir: TempDir,
    tree: MockClassTree,
    config: HalConfig,
}

impl BrickTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let tree = MockClassTree::new(temp_dir.path())
            .device(
                classes::TACHO_MOTOR,
                "motor0",
                &[
                    ("address", ports::OUTPUT_A),
                    ("driver_name", "lego-ev3-l-motor"),
                    ("commands", "run-forever run-to-abs-pos run-to-rel-pos stop reset"),
                    ("command", ""),
                    ("position_sp", "0"),
                    ("state", ""),
                ],
            )
            .unwrap()
            .device(
                classes::TACHO_MOTOR,
                "motor3",
                &[
                    ("address", ports::OUTPUT_D),
                    ("driver_name", "lego-ev3-m-motor"),
                    ("state", ""),
                ],
            )
            .unwrap()
            .device(
                classes::SENSOR,
                "sensor0",
                &[("address", ports::INPUT_1), ("driver_name", "lego-ev3-touch")],
            )
            .unwrap()
            .device(
                classes::SENSOR,
                "sensor1",
                &[
                    ("address", ports::INPUT_2),
                    ("driver_name", "lego-ev3-color"),
                    ("mode", "COL-REFLECT"),
                    ("modes", "COL-REFLECT COL-AMBIENT COL-COLOR"),
                    ("value0", "37"),
                ],
            )
            .unwrap()
            .device(
                classes::LEDS,
                "ev3:left:green:ev3dev",
                &[("brightness", "0"), ("trigger", "none [heartbeat] timer")],
            )
            .unwrap();

        let mut config = HalConfig::with_class_root(temp_dir.path());
        config.tick_interval_ms = 5;

        Self {
            temp_dir,
            tree,
            config,
        }
    }

    fn resolver(&self) -> Resolver {
        Resolver::from_config(&self.config)
    }

    fn motor(&self, address: &str) -> Device {
        let query =
            Query::indexed(classes::TACHO_MOTOR, "motor(\\d*)", Some(address), &[]).unwrap();
        self.resolver().resolve(&query).unwrap()
    }
}

#[test]
fn test_resolve_sensor_by_port() {
    let env = BrickTestEnv::new();
    let query = Query::new(classes::SENSOR).with_constraint("address", ports::INPUT_2);

    let sensor = env.resolver().resolve(&query).unwrap();
    assert!(sensor.connected());
    assert_eq!(sensor.name(), Some("sensor1"));
    assert_eq!(sensor.index(), Some(1));
    assert_eq!(
        sensor.path(),
        Some(env.tree.device_path(classes::SENSOR, "sensor1").as_path())
    );
}

#[test]
fn test_resolve_motor_index_from_name() {
    let env = BrickTestEnv::new();
    let motor = env.motor(ports::OUTPUT_D);
    assert_eq!(motor.name(), Some("motor3"));
    assert_eq!(motor.index(), Some(3));
}

#[test]
fn test_resolved_device_satisfies_query() {
    let env = BrickTestEnv::new();
    let query = Query::indexed(
        classes::TACHO_MOTOR,
        "^motor",
        None,
        &["lego-ev3-m-motor", "lego-nxt-motor"],
    )
    .unwrap();

    for device in env.resolver().matches(&query).unwrap() {
        assert!(device.name().unwrap().starts_with("motor"));
        let driver = device.read_raw("driver_name").unwrap();
        assert!(driver == "lego-ev3-m-motor" || driver == "lego-nxt-motor");
    }
}

#[test]
fn test_absent_class_is_not_an_error() {
    let env = BrickTestEnv::new();
    let servo = env.resolver().resolve(&Query::new(classes::SERVO_MOTOR)).unwrap();

    assert!(!servo.connected());
    assert_eq!(servo.index(), None);
    assert!(matches!(servo.read_raw("state"), Err(DeviceError::NotConnected)));
}

#[test]
fn test_unplugged_device_reads_fail() {
    let env = BrickTestEnv::new();
    let motor = env.motor(ports::OUTPUT_A);
    assert!(motor.connected());

    env.tree.remove(classes::TACHO_MOTOR, "motor0").unwrap();
    assert!(matches!(motor.read_raw("state"), Err(DeviceError::Io { .. })));
}

#[test]
fn test_typed_reads() {
    let env = BrickTestEnv::new();
    let sensor = env
        .resolver()
        .resolve(&Query::new(classes::SENSOR).with_constraint("driver_name", "lego-ev3-color"))
        .unwrap();

    assert_eq!(sensor.read_number("value0").unwrap(), Some(37.0));
    assert_eq!(sensor.read_number("mode").unwrap(), None);
    assert_eq!(
        sensor.read_sequence("modes").unwrap(),
        vec!["COL-REFLECT", "COL-AMBIENT", "COL-COLOR"]
    );

    let led = env.resolver().resolve(&Query::new(classes::LEDS)).unwrap();
    assert_eq!(led.read_selector("trigger").unwrap(), Some("heartbeat".to_string()));
    assert_eq!(
        led.read_sequence("trigger").unwrap(),
        vec!["none", "heartbeat", "timer"]
    );
}

#[test]
fn test_bulk_write() {
    let env = BrickTestEnv::new();
    let motor = env.motor(ports::OUTPUT_A);

    motor
        .write_all([("position_sp", "360"), ("command", "run-to-rel-pos")])
        .unwrap();
    assert_eq!(
        env.tree
            .get(classes::TACHO_MOTOR, "motor0", "command")
            .unwrap(),
        "run-to-rel-pos"
    );
    assert_eq!(motor.read_int("position_sp").unwrap(), Some(360));
}

#[test]
fn test_named_device_from_config_file() {
    let env = BrickTestEnv::new();
    let path = env.temp_dir.path().join("classdev.toml");

    let mut config = env.config.clone();
    config.devices.insert(
        "touch".to_string(),
        DeviceSpec::new(classes::SENSOR)
            .with_pattern("sensor(\\d*)")
            .with_constraint("driver_name", ["lego-ev3-touch", "lego-nxt-touch"]),
    );
    config.save(&path).unwrap();

    let loaded = HalConfig::load(&path).unwrap();
    let touch = Resolver::from_config(&loaded)
        .resolve_named(&loaded, "touch")
        .unwrap();
    assert_eq!(touch.name(), Some("sensor0"));
}

#[test]
fn test_persistent_notification_from_device_state() {
    let env = BrickTestEnv::new();
    let motor = env.motor(ports::OUTPUT_A);
    let scheduler = Scheduler::manual();
    let fired = Arc::new(Mutex::new(0));
    let count = Arc::clone(&fired);

    scheduler.subscribe(
        motor,
        |m| Ok(m.read_sequence("state")?.iter().any(|s| s == "stalled")),
        move |result: Result<&mut Device, DeviceError>| {
            result.unwrap();
            *count.lock().unwrap() += 1;
        },
        Trigger::Always,
    );

    env.tree
        .set(classes::TACHO_MOTOR, "motor0", "state", "running stalled")
        .unwrap();
    scheduler.tick();
    env.tree
        .set(classes::TACHO_MOTOR, "motor0", "state", "running")
        .unwrap();
    scheduler.tick();
    env.tree
        .set(classes::TACHO_MOTOR, "motor0", "state", "stalled")
        .unwrap();
    scheduler.tick();

    assert_eq!(*fired.lock().unwrap(), 2);
    assert_eq!(scheduler.pending(), 1);
}

#[test]
fn test_predicate_io_error_removes_request() {
    let env = BrickTestEnv::new();
    let motor = env.motor(ports::OUTPUT_D);
    let scheduler = Scheduler::manual();

    let notified = scheduler.await_predicate(motor, |m| Ok(m.read_raw("state")? == "holding"));
    env.tree.remove(classes::TACHO_MOTOR, "motor3").unwrap();
    scheduler.tick();

    match notified.wait() {
        Err(DeviceError::Predicate(e)) => {
            assert!(matches!(
                e.downcast_ref::<DeviceError>(),
                Some(DeviceError::Io { .. })
            ));
        }
        other => panic!("Expected predicate error, got {:?}", other),
    }
    assert_eq!(scheduler.pending(), 0);
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_await_motor_holding() {
    let env = BrickTestEnv::new();
    let motor = env.motor(ports::OUTPUT_A);
    let scheduler = Scheduler::from_config(&env.config);
    assert_eq!(scheduler.interval(), Duration::from_millis(5));

    motor.write("command", "run-to-rel-pos").unwrap();
    let notified = scheduler.await_predicate(motor, |m| {
        Ok(m.read_sequence("state")?.iter().any(|s| s == "holding"))
    });
    assert!(scheduler.is_running());

    // The "driver" finishes the move a little later.
    let tree = env.tree.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        tree.set(classes::TACHO_MOTOR, "motor0", "state", "holding")
            .unwrap();
    });

    let motor = tokio::time::timeout(Duration::from_secs(5), notified)
        .await
        .expect("motor never reached holding")
        .unwrap();
    assert_eq!(motor.name(), Some("motor0"));
    assert_eq!(motor.read_raw("command").unwrap(), "run-to-rel-pos");
}
