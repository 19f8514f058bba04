use gemcrust_common::PhotoAttachment;

/// Number of trailing file-id characters that differ between the size
/// variants Telegram generates for one uploaded photo.
const VARIANT_SUFFIX_CHARS: usize = 7;

/// Identity shared by every size variant of the same photo.
pub fn photo_identity(file_id: &str) -> &str {
    match file_id.char_indices().rev().nth(VARIANT_SUFFIX_CHARS - 1) {
        Some((idx, _)) if idx > 0 => &file_id[..idx],
        _ => file_id,
    }
}

/// Keep only the largest variant of each distinct photo, in order of first
/// appearance. Ties keep the earlier variant.
pub fn select_largest_variants(photos: &[PhotoAttachment]) -> Vec<PhotoAttachment> {
    let mut selected: Vec<(&str, &PhotoAttachment)> = Vec::new();

    for photo in photos {
        let identity = photo_identity(&photo.file_id);
        match selected.iter_mut().find(|(id, _)| *id == identity) {
            Some(entry) => {
                if photo.size > entry.1.size {
                    entry.1 = photo;
                }
            }
            None => selected.push((identity, photo)),
        }
    }

    selected.into_iter().map(|(_, photo)| photo.clone()).collect()
}
