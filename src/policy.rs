use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Единая политика проверки: допуски, наборы точек и ограничения на объём работы.
/// Передаётся во все проверяющие функции вместо разбросанных по коду констант.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckPolicy {
	/// Допустимое расхождение численных значений, масштабируется на `max(1, |a|, |b|)`.
	pub tolerance: f64,
	/// Основная переменная задач.
	pub variable: String,
	/// Точки, в которых сравниваются полные выражения соседних шагов.
	pub sample_points: Vec<f64>,
	/// Точки, в которых сравниваются выражения под знаком предела.
	pub inner_sample_points: Vec<f64>,
	/// Значения по модулю больше этого не участвуют в сравнении.
	pub max_sample_magnitude: f64,
	/// Сколько раз подряд можно применить правило Лопиталя.
	pub max_lhopital_depth: usize,
	/// Глубина рекурсии символьных правил для пределов.
	pub max_limit_depth: usize,
	/// Показатели `k` для пробных точек `10^k` (или `10^-k` у конечной точки).
	pub limit_probe_exponents: Vec<i32>,
	/// Внутренние точки, в которых проверяется дифференциальное соотношение уравнения Вольтерры.
	pub volterra_sample_points: Vec<f64>,
	/// Вставлять ли маркер `LIMIT` в середину решения, если студент его не указал.
	pub infer_limit_marker: bool,
}

impl Default for CheckPolicy {
	fn default() -> Self {
		CheckPolicy {
			tolerance: 1e-6,
			variable: "x".to_string(),
			sample_points: vec![-1.5, 0.5, 1.5, 2.0, 3.0, 5.0, 10.0, 50.0, 100.0],
			inner_sample_points: vec![2.0, 5.0, 10.0, 50.0, 100.0],
			max_sample_magnitude: 1e12,
			max_lhopital_depth: 4,
			max_limit_depth: 12,
			limit_probe_exponents: (2..=8).collect(),
			volterra_sample_points: vec![0.25, 0.5, 1.0, 1.5, 2.0],
			infer_limit_marker: true,
		}
	}
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("cannot read config `{path}`: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid config: {0}")]
	Toml(#[from] toml::de::Error),
}

impl CheckPolicy {
	pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml(&text)
	}

	/// Различаются ли два численных значения с учётом допуска.
	pub fn differs(&self, a: f64, b: f64) -> bool {
		let scale = 1f64.max(a.abs()).max(b.abs());
		(a - b).abs() > self.tolerance * scale
	}

	/// Та же политика, но шаги сравниваются только в положительных точках. Нужна для пределов при `x → +∞`, где
	/// преобразования вроде внесения `x` под корень верны лишь для `x > 0`.
	pub fn positive_samples(&self) -> CheckPolicy {
		CheckPolicy {
			sample_points: self.sample_points.iter().copied().filter(|point| *point > 0.0).collect(),
			..self.clone()
		}
	}

	/// Можно ли доверять значению при численном сравнении.
	pub fn is_comparable(&self, value: f64) -> bool {
		value.is_finite() && value.abs() <= self.max_sample_magnitude
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partial_config_keeps_defaults() {
		let policy = CheckPolicy::from_toml("tolerance = 1e-9\nsample_points = [1.0, 2.0]").unwrap();
		assert_eq!(policy.tolerance, 1e-9);
		assert_eq!(policy.sample_points, vec![1.0, 2.0]);
		assert_eq!(policy.variable, "x");
		assert!(policy.infer_limit_marker);
	}

	#[test]
	fn negative_point_by_default() {
		let policy = CheckPolicy::default();
		assert!(policy.sample_points.iter().any(|point| *point < 0.0));
		let positive = policy.positive_samples();
		assert!(positive.sample_points.iter().all(|point| *point > 0.0));
		assert_eq!(positive.inner_sample_points, policy.inner_sample_points);
	}

	#[test]
	fn relative_tolerance() {
		let policy = CheckPolicy::default();
		assert!(!policy.differs(1e10, 1e10 + 1.0));
		assert!(policy.differs(1.0, 1.001));
	}
}
