//! Split Model
//!
//! Linear model over normalized split features. Training and prediction
//! share `normalized_terms`, so a coefficient always multiplies the same
//! centered and scaled quantity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::features::SplitFeatures;

/// Model-backed predictions are clamped to this permille range
pub const MIN_PREDICTION: i32 = 200;
pub const MAX_PREDICTION: i32 = 800;

/// Declares the model terms once: the weight struct, the term names and
/// the normalization applied to each feature.
macro_rules! linear_terms {
    ($( $name:ident => |$f:ident| $term:expr ),* $(,)?) => {
        /// One weight per model term. Weights absent from a stored model
        /// (trained before the term existed) deserialize as zero.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct FeatureWeights {
            $(
                #[serde(default)]
                pub $name: f64,
            )*
        }

        /// Term names in coefficient order
        pub const TERM_NAMES: &[&str] = &[$(stringify!($name)),*];

        /// Number of model terms
        pub const TERM_COUNT: usize = TERM_NAMES.len();

        impl FeatureWeights {
            pub fn to_array(&self) -> [f64; TERM_COUNT] {
                [$(self.$name),*]
            }

            pub fn from_array(values: [f64; TERM_COUNT]) -> Self {
                let [$($name),*] = values;
                Self { $($name),* }
            }
        }

        /// Center and scale every feature so gradients are comparable
        pub fn normalized_terms(features: &SplitFeatures) -> [f64; TERM_COUNT] {
            [$({
                let $f = features;
                $term
            }),*]
        }
    };
}

linear_terms! {
    center_darkest_idx => |f| f.center_darkest_idx - 50.0,
    center_brightest_idx => |f| f.center_brightest_idx - 50.0,
    center_darkest_p10 => |f| (f.center_darkest_p10 - 128.0) / 50.0,
    center_brightest_p10 => |f| (f.center_brightest_p10 - 128.0) / 50.0,
    center_mean_p10 => |f| (f.center_mean_p10 - 128.0) / 50.0,
    center_variance_p10 => |f| f.center_variance_p10 / 1000.0,
    edge_left_p10 => |f| (f.edge_left_p10 - 128.0) / 50.0,
    edge_right_p10 => |f| (f.edge_right_p10 - 128.0) / 50.0,
    edge_center_diff => |f| f.edge_center_diff / 50.0,
    is_inverted => |f| f.is_inverted,
    predicted_position => |f| (f.predicted_position - 500.0) / 10.0,
    gutter_width => |f| f.gutter_width / 10.0,
    predicted_p10 => |f| (f.predicted_p10 - 128.0) / 50.0,
    predicted_dark_run => |f| f.predicted_dark_run / 10.0,
    predicted_transitions => |f| f.predicted_transitions / 10.0,
    left_page_text_end => |f| (f.left_page_text_end - 500.0) / 10.0,
    right_page_text_start => |f| (f.right_page_text_start - 500.0) / 10.0,
    text_gap_width => |f| f.text_gap_width / 10.0,
    text_gap_center => |f| (f.text_gap_center - 500.0) / 10.0,
    left_margin => |f| f.left_margin / 10.0,
    right_margin => |f| f.right_margin / 10.0,
    margin_bias => |f| f.margin_bias / 10.0,
    ideal_split_from_text => |f| (f.ideal_split_from_text - 500.0) / 10.0,
    aspect_ratio => |f| f.aspect_ratio - 1.5,
    width => |f| (f.width - 2000.0) / 1000.0,
    height => |f| (f.height - 2000.0) / 1000.0,
    page_position => |f| f.page_position.map_or(0.0, |p| p - 0.5),
    book_size_category => |f| f.book_size_category.map_or(0.0, |c| c - 1.0),
}

/// Bias plus one weight per term
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitCoefficients {
    #[serde(default)]
    pub bias: f64,
    #[serde(flatten)]
    pub weights: FeatureWeights,
}

impl SplitCoefficients {
    /// Bias-only coefficients
    pub fn with_bias(bias: f64) -> Self {
        Self {
            bias,
            weights: FeatureWeights::default(),
        }
    }

    /// Unclamped linear output on the permille scale
    pub fn raw_output(&self, features: &SplitFeatures) -> f64 {
        let terms = normalized_terms(features);
        let weights = self.weights.to_array();
        self.bias
            + terms
                .iter()
                .zip(weights.iter())
                .map(|(t, w)| t * w)
                .sum::<f64>()
    }
}

/// A trained split model snapshot. Retraining replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitModel {
    pub coefficients: SplitCoefficients,
    pub trained_at: DateTime<Utc>,
    pub training_size: usize,
    #[serde(rename = "validationMSE")]
    pub validation_mse: f64,
}

impl SplitModel {
    /// Predict the split position, rounded and clamped to [200, 800]
    pub fn predict(&self, features: &SplitFeatures) -> i32 {
        clamp_prediction(self.coefficients.raw_output(features))
    }
}

/// Round to the nearest permille and clamp to the plausible range
pub fn clamp_prediction(raw: f64) -> i32 {
    if !raw.is_finite() {
        return crate::split::types::CENTER_POSITION;
    }
    (raw.round() as i32).clamp(MIN_PREDICTION, MAX_PREDICTION)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Features whose normalized terms are all zero
    pub(crate) fn neutral_features() -> SplitFeatures {
        SplitFeatures {
            center_darkest_idx: 50.0,
            center_brightest_idx: 50.0,
            center_darkest_p10: 128.0,
            center_brightest_p10: 128.0,
            center_mean_p10: 128.0,
            center_variance_p10: 0.0,
            edge_left_p10: 128.0,
            edge_right_p10: 128.0,
            edge_center_diff: 0.0,
            is_inverted: 0.0,
            predicted_position: 500.0,
            gutter_width: 0.0,
            predicted_p10: 128.0,
            predicted_dark_run: 0.0,
            predicted_transitions: 0.0,
            left_page_text_end: 500.0,
            right_page_text_start: 500.0,
            text_gap_width: 0.0,
            text_gap_center: 500.0,
            left_margin: 0.0,
            right_margin: 0.0,
            margin_bias: 0.0,
            ideal_split_from_text: 500.0,
            aspect_ratio: 1.5,
            width: 2000.0,
            height: 2000.0,
            page_position: None,
            book_size_category: None,
        }
    }

    fn model(coefficients: SplitCoefficients) -> SplitModel {
        SplitModel {
            coefficients,
            trained_at: Utc::now(),
            training_size: 0,
            validation_mse: 0.0,
        }
    }

    #[test]
    fn test_neutral_features_have_zero_terms() {
        let terms = normalized_terms(&neutral_features());
        assert!(terms.iter().all(|&t| t == 0.0));
        assert_eq!(terms.len(), TERM_COUNT);
        assert_eq!(TERM_NAMES.len(), 28);
    }

    #[test]
    fn test_weight_array_round_trip_preserves_order() {
        let mut values = [0.0; TERM_COUNT];
        for (i, v) in values.iter_mut().enumerate() {
            *v = i as f64;
        }
        let weights = FeatureWeights::from_array(values);
        assert_eq!(weights.center_darkest_idx, 0.0);
        assert_eq!(weights.book_size_category, (TERM_COUNT - 1) as f64);
        assert_eq!(weights.to_array(), values);
    }

    #[test]
    fn test_predict_uses_bias_and_weights() {
        let mut features = neutral_features();
        features.predicted_position = 540.0;

        let mut coefficients = SplitCoefficients::with_bias(500.0);
        coefficients.weights.predicted_position = 10.0;

        assert_eq!(model(coefficients).predict(&features), 540);
    }

    #[test]
    fn test_predict_is_clamped() {
        let features = neutral_features();
        assert_eq!(model(SplitCoefficients::with_bias(950.0)).predict(&features), 800);
        assert_eq!(model(SplitCoefficients::with_bias(12.0)).predict(&features), 200);
        assert_eq!(model(SplitCoefficients::with_bias(f64::NAN)).predict(&features), 500);
    }

    #[test]
    fn test_missing_coefficients_default_to_zero() {
        let json = r#"{
            "coefficients": { "bias": 480.0, "predictedPosition": 2.5 },
            "trainedAt": "2026-01-05T10:00:00Z",
            "trainingSize": 42,
            "validationMSE": 12.5
        }"#;
        let model: SplitModel = serde_json::from_str(json).unwrap();
        assert_eq!(model.coefficients.bias, 480.0);
        assert_eq!(model.coefficients.weights.predicted_position, 2.5);
        assert_eq!(model.coefficients.weights.text_gap_center, 0.0);
        assert_eq!(model.coefficients.weights.page_position, 0.0);
        assert_eq!(model.training_size, 42);
    }

    #[test]
    fn test_book_context_terms_are_neutral_when_absent() {
        let mut coefficients = SplitCoefficients::with_bias(500.0);
        coefficients.weights.page_position = 100.0;
        coefficients.weights.book_size_category = 100.0;

        let mut features = neutral_features();
        assert_eq!(model(coefficients).predict(&features), 500);

        features.page_position = Some(1.0);
        assert_eq!(model(coefficients).predict(&features), 550);
    }
}
