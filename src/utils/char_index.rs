use std::ops::Range;

/// Номер символа, с которого начинается байт `byte`. Конец строки тоже допустим.
pub fn char_position(s: &str, byte: usize) -> Option<usize> {
	s.char_indices()
		.map(|(index, _)| index)
		.chain(std::iter::once(s.len()))
		.position(|index| index == byte)
}

/// Один символ, на который указывает байтовое смещение ошибки. Смещение за концом строки указывает на последний символ.
pub fn error_char(s: &str, byte: usize) -> Option<Range<usize>> {
	let count = s.chars().count();
	if count == 0 {
		return None;
	}
	let start = char_position(s, byte.min(s.len()))?.min(count - 1);
	Some(start..start + 1)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cyrillic() {
		let s = "ф(x) + ∞";
		assert_eq!(char_position(s, 2), Some(1));
		assert_eq!(char_position(s, 1), None);
		assert_eq!(error_char(s, s.len()), Some(7..8));
		assert_eq!(error_char("", 0), None);
	}
}
