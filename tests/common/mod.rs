//! Synthetic KMALL files for the integration tests
#![allow(dead_code)]
use kmall::parser::install::ParameterText;
use kmall::parser::multibeam::{
    Mrz, MultibeamBody, PingInfo, RxInfo, Sounding, Soundings, TxSectorInfo,
};
use kmall::parser::sensor::{KmBinary, KmDelayedHeave, Skm, SkmInfo};
use kmall::parser::{DatagramKind, Header, Record};

pub const START: u32 = 1_600_000_000;

pub fn iip() -> ParameterText {
    ParameterText {
        header: Header::new(DatagramKind::InstallationParameters, 1, START, 0),
        info: 0,
        status: 0,
        text: "OSCV:Empty,EMXV:EM2040P,\nTRAI_TX1:N=1;X=0.1;Y=0;Z=0.5,".to_string(),
    }
}

fn sounding(i: u16) -> Sounding {
    Sounding {
        sounding_index: i,
        tx_sector_numb: if i < 3 { 0 } else { 1 },
        detection_method: 1,
        quality_factor: 0.1,
        mean_abs_coeff_db_per_km: 60.0,
        reflectivity1_db: -20.0 - f32::from(i),
        reflectivity2_db: -20.5,
        z_re_ref_point_m: 50.0 + f32::from(i),
        y_re_ref_point_m: -40.0 + 20.0 * f32::from(i),
        si_num_samples: 3,
        ..Default::default()
    }
}

/// Two sectors, five soundings with three seabed image samples each
pub fn mrz(ping: u16, time_sec: u32) -> Mrz {
    Mrz {
        header: Header::new(DatagramKind::RangeAndDepth, 1, time_sec, 0),
        body: MultibeamBody {
            ping_cnt: ping,
            rx_fans_per_ping: 1,
            swaths_per_ping: 1,
            ..Default::default()
        },
        ping_info: PingInfo {
            ping_rate_hz: 2.0,
            latitude_deg: 63.4,
            longitude_deg: 10.4,
            ..Default::default()
        },
        sectors: (0..2u8)
            .map(|n| TxSectorInfo {
                tx_sector_numb: n,
                centre_freq_hz: 300_000.0,
                high_voltage_level_db: Some(1.0),
                sector_tracking_corr_db: Some(0.0),
                effective_signal_length_sec: Some(0.0002),
                ..Default::default()
            })
            .collect::<Vec<_>>()
            .into(),
        rx_info: RxInfo {
            num_soundings_max_main: 5,
            num_soundings_valid_main: 5,
            ..Default::default()
        },
        soundings: (0..5u16).map(sounding).collect::<Soundings>(),
        seabed_image: (0..15).map(|v| v * 7 - 50).collect(),
        ..Default::default()
    }
}

/// Three attitude samples 10 ms apart
pub fn skm(time_sec: u32) -> Skm {
    Skm {
        header: Header::new(DatagramKind::KmBinary, 1, time_sec, 0),
        info: SkmInfo {
            sensor_system: 1,
            ..Default::default()
        },
        samples: (0..3u32)
            .map(|i| KmBinary {
                dgm_type: *b"#KMB",
                num_bytes_dgm: 120,
                dgm_version: 1,
                time_sec,
                time_nanosec: i * 10_000_000,
                roll_deg: 0.5,
                pitch_deg: -0.5,
                heading_deg: 90.0,
                ..Default::default()
            })
            .collect(),
        delayed_heave: (0..3u32)
            .map(|_| KmDelayedHeave {
                time_sec,
                time_nanosec: 0,
                delayed_heave_m: 0.0,
            })
            .collect(),
    }
}

/// `#IIP`, one `#MRZ` and one `#SKM`, a second apart
pub fn small_file() -> Vec<u8> {
    [
        iip().to_bytes().unwrap(),
        mrz(1, START + 1).to_bytes().unwrap(),
        skm(START + 2).to_bytes().unwrap(),
    ]
    .concat()
}
