//! Rate control and readout surfaces on a live engine.

use std::sync::Arc;

use dual_sonar::config::SonarConfig;
use dual_sonar::control::{RateControl, ReadoutSurface, NO_MEASUREMENT};
use dual_sonar::hardware::mock::MockGpio;
use dual_sonar::ranging::{EdgeKind, RangingEngine};
use dual_sonar::SonarError;

#[test]
fn test_invalid_rates_leave_period_unchanged() {
    let engine = RangingEngine::new(&SonarConfig::default()).unwrap();
    let control = RateControl::new(&engine);

    assert_eq!(control.write("3\n").unwrap(), 3);
    for input in ["51", "-1", "abc", "", "1e2"] {
        let err = control.write(input).unwrap_err();
        assert!(matches!(err, SonarError::InvalidConfig(_)), "{input:?}: {err}");
        assert_eq!(engine.period(), 3);
    }

    assert_eq!(control.write(" 7\n").unwrap(), 7);
    assert_eq!(control.read(), "7\n");
}

#[test]
fn test_initial_period_comes_from_config() {
    let mut config = SonarConfig::default();
    config.timing.sample_period_secs = 4;
    let engine = RangingEngine::new(&config).unwrap();
    assert_eq!(RateControl::new(&engine).read(), "4\n");
}

#[tokio::test(start_paused = true)]
async fn test_readout_before_and_after_first_measurement() {
    let gpio = MockGpio::new();
    let mut engine = RangingEngine::new(&SonarConfig::default()).unwrap();
    engine.start(Arc::new(gpio.clone()), gpio.clock()).unwrap();
    assert_eq!(ReadoutSurface::new(&engine).read(), NO_MEASUREMENT);

    RateControl::new(&engine).write("1").unwrap();
    gpio.wait_for_pulses(1).await;
    gpio.emit_at(20, EdgeKind::Rising, 5_000);
    gpio.emit_at(20, EdgeKind::Falling, 5_002);
    gpio.emit_at(21, EdgeKind::Rising, 5_000);
    gpio.emit_at(21, EdgeKind::Falling, 6_000);

    let mut readings = engine.subscribe();
    readings.wait_for(|r| r.readings == 2).await.unwrap();
    assert_eq!(
        ReadoutSurface::new(&engine).read(),
        "ch0=3500 ch1=1750000\n"
    );

    engine.stop().await.unwrap();
}
