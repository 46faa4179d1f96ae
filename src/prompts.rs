//! Ready-made edit instructions ("quick ideas").

/// Preset instructions offered alongside free-text input.
pub const READY_PROMPTS: &[&str] = &[
    "Make the sky a vibrant sunset orange",
    "Turn this photo into a watercolor painting",
    "Convert to black and white with high contrast",
    "Add a light snowfall to the scene",
    "Make it look like a vintage 1970s photograph",
    "Remove the background and replace it with a clean white studio backdrop",
    "Add a cinematic teal and orange color grade",
    "Turn it into a pencil sketch",
    "Make it look like it was taken at night under neon lights",
    "Give it a Studio Ghibli-style animated look",
];

/// Looks up a preset by 1-based number, as shown in listings.
pub fn preset(number: usize) -> Option<&'static str> {
    number
        .checked_sub(1)
        .and_then(|i| READY_PROMPTS.get(i))
        .copied()
}
