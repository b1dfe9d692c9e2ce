//! Visual challenge generation.
//!
//! A challenge is a short numeric code rendered as an image plus an opaque
//! token. The token is stored hashed with the expected answer; verification
//! is a single consume-and-compare against the store (see the auth storage
//! helpers) so a token can never be checked twice.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{Rng, RngCore, rngs::OsRng};

/// Number of digits in a challenge code.
const CODE_LEN: usize = 4;

/// Challenge lifetime in seconds.
pub const CAPTCHA_TTL_SECONDS: i64 = 5 * 60;

/// A freshly generated challenge: the answer to store and the rendering to
/// hand to the client.
#[derive(Debug)]
pub struct Challenge {
    pub code: String,
    pub image_data_url: String,
}

/// Generate a random numeric challenge and its rendering.
///
/// # Errors
/// Returns an error if the system RNG fails.
pub fn generate() -> Result<Challenge> {
    let mut rng = OsRng;
    // try_fill_bytes probes the RNG once so a dead entropy source surfaces
    // as an error instead of a panic inside gen_range.
    let mut probe = [0u8; 1];
    rng.try_fill_bytes(&mut probe)
        .context("failed to generate captcha code")?;

    let code: String = (0..CODE_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect();
    let image_data_url = render_data_url(&code);
    Ok(Challenge {
        code,
        image_data_url,
    })
}

/// Compare a submitted answer against the stored one, case-insensitively.
#[must_use]
pub fn answer_matches(expected: &str, submitted: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(submitted.trim())
}

/// Render the code as an SVG data URL.
///
/// Glyph positions are jittered per character to make naive scraping a
/// little harder; the visual treatment is presentation only and carries no
/// security weight beyond the single-use token.
fn render_data_url(code: &str) -> String {
    let mut rng = rand::thread_rng();
    let mut glyphs = String::new();
    for (index, ch) in code.chars().enumerate() {
        let x = 14 + index * 26 + rng.gen_range(0..6);
        let y = 28 + rng.gen_range(0..8);
        let rotate = rng.gen_range(-14i32..14);
        glyphs.push_str(&format!(
            "<text x=\"{x}\" y=\"{y}\" transform=\"rotate({rotate} {x} {y})\" \
             font-family=\"monospace\" font-size=\"26\" fill=\"#333\">{ch}</text>"
        ));
    }
    let svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"120\" height=\"40\">\
         <rect width=\"120\" height=\"40\" fill=\"#f2f2f2\"/>{glyphs}</svg>"
    );
    let encoded = base64::engine::general_purpose::STANDARD.encode(svg.as_bytes());
    format!("data:image/svg+xml;base64,{encoded}")
}

#[cfg(test)]
mod tests {
    use super::{CODE_LEN, answer_matches, generate};
    use anyhow::Result;

    #[test]
    fn generated_code_is_numeric_and_sized() -> Result<()> {
        let challenge = generate()?;
        assert_eq!(challenge.code.len(), CODE_LEN);
        assert!(challenge.code.chars().all(|c| c.is_ascii_digit()));
        Ok(())
    }

    #[test]
    fn rendering_is_a_data_url() -> Result<()> {
        let challenge = generate()?;
        assert!(
            challenge
                .image_data_url
                .starts_with("data:image/svg+xml;base64,")
        );
        Ok(())
    }

    #[test]
    fn answer_comparison_ignores_case_and_whitespace() {
        assert!(answer_matches("AB12", " ab12 "));
        assert!(answer_matches("1234", "1234"));
        assert!(!answer_matches("1234", "1235"));
        assert!(!answer_matches("1234", ""));
    }
}
