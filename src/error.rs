use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Вид ошибки шага решения. Именно эти значения сохраняются в поле `error_type` шага.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	/// Два соседних шага не равносильны.
	AlgebraicError,
	/// Предел не вычисляется или не совпадает с ожидаемым.
	LimitError,
	/// Выражение под пределом или ответ не удалось разобрать.
	LimitParseError,
	/// Выражение не удалось перевести в символьную форму.
	ParseError,
	/// Окончательный ответ интегральной задачи неверен.
	IntegralError,
}

impl ErrorKind {
	pub fn as_str(self) -> &'static str {
		use ErrorKind::*;

		match self {
			AlgebraicError => "algebraic_error",
			LimitError => "limit_error",
			LimitParseError => "limit_parse_error",
			ParseError => "parse_error",
			IntegralError => "integral_error",
		}
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Отрицательный результат проверки: вид ошибки и подсказка для студента.
#[derive(Clone, Debug, Error, Eq, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {hint}")]
pub struct StepFailure {
	pub kind: ErrorKind,
	pub hint: String,
}

impl StepFailure {
	pub fn new(kind: ErrorKind, hint: impl Into<String>) -> Self {
		StepFailure { kind, hint: hint.into() }
	}
}

/// Результат любой проверки движка. Успех несёт полезную нагрузку (например, вычисленный предел).
pub type StepResult<T = ()> = Result<T, StepFailure>;

/// Выражение не удалось перевести в символьную форму.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("cannot parse expression `{raw}`: {message}")]
pub struct ParseError {
	/// Строка в том виде, в каком её прислал студент.
	pub raw: String,
	/// Текст, который увидел разборщик после замены обозначений.
	pub input: String,
	pub message: String,
	/// Байтовое смещение ошибки в `input`, если оно известно.
	pub offset: Option<usize>,
}

impl ParseError {
	pub fn new(raw: impl Into<String>, message: impl Into<String>) -> Self {
		let raw = raw.into();
		ParseError {
			input: raw.clone(),
			raw,
			message: message.into(),
			offset: None,
		}
	}

	pub fn at(raw: impl Into<String>, input: impl Into<String>, message: impl Into<String>, offset: usize) -> Self {
		ParseError {
			raw: raw.into(),
			input: input.into(),
			message: message.into(),
			offset: Some(offset),
		}
	}
}
