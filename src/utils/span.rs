use annotate_snippets::{
	display_list::{DisplayList, FormatOptions},
	snippet::{Annotation, AnnotationType, Slice, Snippet, SourceAnnotation},
};

use crate::error::ParseError;
use crate::utils::char_index::error_char;

/// Ошибка разбора в формате `snippet`: строка, которую видел разборщик, и отмеченное место ошибки.
pub fn parse_error_snippet(err: &ParseError, color: bool) -> String {
	let title = format!("cannot parse `{}`", err.raw);
	let rewritten = format!("notation rewritten to `{}`", err.input);

	let annotations = err
		.offset
		.and_then(|offset| error_char(&err.input, offset))
		.map(|range| SourceAnnotation {
			label: err.message.as_str(),
			annotation_type: AnnotationType::Error,
			range: (range.start, range.end),
		})
		.into_iter()
		.collect::<Vec<_>>();

	let footer = if annotations.is_empty() {
		vec![Annotation {
			label: Some(err.message.as_str()),
			id: None,
			annotation_type: AnnotationType::Note,
		}]
	} else if err.input != err.raw {
		vec![Annotation {
			label: Some(rewritten.as_str()),
			id: None,
			annotation_type: AnnotationType::Note,
		}]
	} else {
		vec![]
	};

	let snippet = Snippet {
		title: Some(Annotation {
			label: Some(title.as_str()),
			id: None,
			annotation_type: AnnotationType::Error,
		}),
		footer,
		slices: vec![Slice {
			source: err.input.as_str(),
			line_start: 1,
			origin: None,
			fold: false,
			annotations,
		}],
		opt: FormatOptions {
			color,
			..Default::default()
		},
	};
	DisplayList::from(snippet).to_string()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parsing::parse_expression;

	#[test]
	fn points_at_error() {
		let err = parse_expression("x + * 2").unwrap_err();
		let rendered = parse_error_snippet(&err, false);
		assert!(rendered.contains("cannot parse `x + * 2`"));
		assert!(rendered.contains("x + * 2"));
		assert!(rendered.contains('^'));
	}
}
