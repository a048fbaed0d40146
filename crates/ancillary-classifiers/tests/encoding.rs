mod common;

use ancillary_classifiers::config::EncoderConfig;
use ancillary_classifiers::data_handling::{BookingRecord, Dataset, PreferenceFlags};
use ancillary_classifiers::preprocessing::{FeatureEncoder, LabelEncoding};
use ancillary_classifiers::PipelineError;

#[test]
fn identical_flag_combinations_share_a_label() {
    let ds = common::synthetic_bookings(300, 7);
    let flags = ds.flags();
    let labels = LabelEncoding::fit(&flags).unwrap();
    let y = labels.encode_all(&flags).unwrap();

    assert!(labels.n_classes() <= 8);
    for (i, a) in flags.iter().enumerate() {
        for (j, b) in flags.iter().enumerate().skip(i + 1) {
            assert_eq!(a == b, y[i] == y[j], "rows {} and {}", i, j);
        }
    }
    // label 0 belongs to the first row
    assert_eq!(y[0], 0);
    for label in 0..labels.n_classes() {
        let decoded = labels.decode(label).unwrap();
        assert_eq!(labels.encode(&decoded).unwrap(), label);
    }
}

#[test]
fn transform_is_idempotent_and_matches_fit_transform() {
    let ds = common::synthetic_bookings(200, 11);
    let (x, state) = FeatureEncoder::new(EncoderConfig::default())
        .fit_transform(&ds)
        .unwrap();

    let again = state.transform(&ds.records).unwrap();
    let twice = state.transform(&ds.records).unwrap();
    assert_eq!(x, again);
    assert_eq!(again, twice);

    // 2 standardized slots followed by the 3 sorted channel indicators
    assert_eq!(x.ncols(), 5);
    assert_eq!(
        &state.feature_names()[2..],
        &[
            "cat__channel_Agent".to_string(),
            "cat__channel_Internet".to_string(),
            "cat__channel_Mobile".to_string()
        ]
    );
    for row in x.rows() {
        let hot: f32 = row.iter().skip(2).sum();
        assert_eq!(hot, 1.0);
    }
    let mean_lead: f32 = x.column(0).sum() / x.nrows() as f32;
    assert!(mean_lead.abs() < 1e-3);
}

#[test]
fn flags_never_become_features() {
    let ds = common::synthetic_bookings(50, 3);
    let state = FeatureEncoder::default().fit(&ds).unwrap();
    assert!(state
        .feature_names()
        .iter()
        .all(|f| !f.contains("wants_")));
}

#[test]
fn encoder_state_survives_serialization() {
    let ds = common::synthetic_bookings(80, 5);
    let state = FeatureEncoder::default().fit(&ds).unwrap();
    let json = serde_json::to_string(&state).unwrap();
    let restored: ancillary_classifiers::preprocessing::EncoderState =
        serde_json::from_str(&json).unwrap();
    assert_eq!(
        restored.transform(&ds.records).unwrap(),
        state.transform(&ds.records).unwrap()
    );
}

#[test]
fn unseen_category_names_column_and_row() {
    let ds = common::synthetic_bookings(40, 9);
    let state = FeatureEncoder::default().fit(&ds).unwrap();
    let unseen = BookingRecord::new(
        vec![10.0, 2.0],
        vec!["Kiosk".to_string()],
        PreferenceFlags::new(false, false, false),
    );
    let err = state
        .transform(&[ds.records[0].clone(), unseen])
        .unwrap_err();
    match err {
        PipelineError::UnknownCategory { column, row, value } => {
            assert_eq!(column, "channel");
            assert_eq!(row, 1);
            assert_eq!(value, "Kiosk");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn empty_dataset_is_rejected() {
    let ds = Dataset::new(common::small_schema(), vec![]).unwrap();
    assert!(matches!(
        FeatureEncoder::default().fit(&ds),
        Err(PipelineError::EmptyDataset)
    ));
}
