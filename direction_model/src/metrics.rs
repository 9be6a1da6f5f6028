//! Classification metrics for direction calls.

use ndarray::Array1;
use serde::Serialize;

const EPS: f64 = 1e-15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut cm = ConfusionMatrix { tp: 0, tn: 0, fp: 0, fn_: 0 };
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t >= 0.5, p >= 0.5) {
                (true, true) => cm.tp += 1,
                (false, false) => cm.tn += 1,
                (false, true) => cm.fp += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 { 0.0 } else { num as f64 / denom as f64 }
}

/// Scores of one evaluated window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub n_samples: usize,
    pub up_rate: f64,
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// `None` when the window holds a single class.
    pub auc: Option<f64>,
    pub log_loss: f64,
    pub brier: f64,
    /// Accuracy of always calling the window's more frequent direction.
    pub majority_baseline: f64,
}

impl ClassificationReport {
    pub fn compute(y_true: &Array1<f64>, p_up: &Array1<f64>, threshold: f64) -> Self {
        let y_pred = p_up.mapv(|p| if p >= threshold { 1.0 } else { 0.0 });
        let confusion = ConfusionMatrix::from_predictions(y_true, &y_pred);
        let n = confusion.total();

        let precision = ratio(confusion.tp, confusion.tp + confusion.fp);
        let recall = ratio(confusion.tp, confusion.tp + confusion.fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let up_rate = ratio(confusion.tp + confusion.fn_, n);

        Self {
            n_samples: n,
            up_rate,
            confusion,
            accuracy: ratio(confusion.tp + confusion.tn, n),
            precision,
            recall,
            f1,
            auc: auc_roc(y_true, p_up),
            log_loss: log_loss(y_true, p_up),
            brier: brier_score(y_true, p_up),
            majority_baseline: if n == 0 { 0.0 } else { up_rate.max(1.0 - up_rate) },
        }
    }

    pub fn summary(&self) -> String {
        let auc = self
            .auc
            .map(|a| format!("{:.4}", a))
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "n={} up-rate={:.3} accuracy={:.4} (baseline {:.4}) auc={} log-loss={:.4} brier={:.4} precision={:.4} recall={:.4} f1={:.4} [tp={} tn={} fp={} fn={}]",
            self.n_samples,
            self.up_rate,
            self.accuracy,
            self.majority_baseline,
            auc,
            self.log_loss,
            self.brier,
            self.precision,
            self.recall,
            self.f1,
            self.confusion.tp,
            self.confusion.tn,
            self.confusion.fp,
            self.confusion.fn_,
        )
    }
}

/// Area under the ROC curve via the rank-sum statistic; tied scores share their average rank.
pub fn auc_roc(y_true: &Array1<f64>, scores: &Array1<f64>) -> Option<f64> {
    let mut pairs: Vec<(f64, bool)> = scores
        .iter()
        .zip(y_true.iter())
        .map(|(&s, &t)| (s, t >= 0.5))
        .collect();
    let n_pos = pairs.iter().filter(|(_, up)| *up).count();
    let n_neg = pairs.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut positive_rank_sum = 0.0;
    let mut i = 0;
    while i < pairs.len() {
        let mut j = i;
        while j < pairs.len() && pairs[j].0 == pairs[i].0 {
            j += 1;
        }
        // ranks i+1..=j averaged over the tie group
        let average_rank = (i + 1 + j) as f64 / 2.0;
        let positives = pairs[i..j].iter().filter(|(_, up)| *up).count();
        positive_rank_sum += average_rank * positives as f64;
        i = j;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

pub fn log_loss(y_true: &Array1<f64>, p_up: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    -y_true
        .iter()
        .zip(p_up.iter())
        .map(|(&t, &p)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            t * p.ln() + (1.0 - t) * (1.0 - p).ln()
        })
        .sum::<f64>()
        / y_true.len() as f64
}

pub fn brier_score(y_true: &Array1<f64>, p_up: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true
        .iter()
        .zip(p_up.iter())
        .map(|(&t, &p)| (p - t).powi(2))
        .sum::<f64>()
        / y_true.len() as f64
}
