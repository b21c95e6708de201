use crate::SprError;

/// Splits a sentence into display regions on runs of whitespace.
///
/// Leading and trailing whitespace is dropped and consecutive whitespace
/// collapses into a single boundary, so every region is non-empty.
pub fn segment(sentence: &str) -> Result<Vec<String>, SprError> {
    let regions: Vec<String> = sentence.split_whitespace().map(str::to_owned).collect();
    if regions.is_empty() {
        return Err(SprError::EmptySentence);
    }
    Ok(regions)
}

/// Joins regions back into a sentence with single spaces.
pub fn rejoin<S: AsRef<str>>(regions: &[S]) -> String {
    let mut out = String::new();
    for (i, region) in regions.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(region.as_ref());
    }
    out
}
