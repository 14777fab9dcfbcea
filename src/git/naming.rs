use std::collections::HashSet;

const TASK_SLUG_MAX_LEN: usize = 50;
const MAX_SUFFIX: u32 = 999;

/// Norwegian towns, in the order candidates are handed out.
pub const PLACE_NAMES: &[&str] = &[
    "Oslo", "Bergen", "Trondheim", "Stavanger", "Drammen", "Fredrikstad",
    "Kristiansand", "Sandnes", "Tromsø", "Sarpsborg", "Skien", "Ålesund",
    "Sandefjord", "Haugesund", "Tønsberg", "Moss", "Porsgrunn", "Bodø",
    "Arendal", "Hamar", "Larvik", "Halden", "Lillehammer", "Harstad",
    "Molde", "Kongsberg", "Gjøvik", "Horten", "Mo i Rana", "Kristiansund",
    "Jessheim", "Elverum", "Alta", "Askim", "Leirvik", "Narvik", "Grimstad",
    "Steinkjer", "Kongsvinger", "Egersund", "Bryne", "Holmestrand",
    "Lillestrøm", "Brumunddal", "Notodden", "Stjørdal", "Levanger",
    "Namsos", "Mosjøen", "Førde", "Florø", "Lyngdal", "Flekkefjord",
    "Mandal", "Kragerø", "Brevik", "Langesund", "Risør", "Tvedestrand",
    "Lillesand", "Farsund", "Hønefoss", "Raufoss", "Vadsø", "Vardø",
    "Kirkenes", "Hammerfest", "Honningsvåg", "Finnsnes", "Svolvær",
    "Sortland", "Stokmarknes", "Brønnøysund", "Sandnessjøen", "Orkanger",
    "Røros", "Oppdal", "Verdal", "Ørsta", "Volda", "Ulsteinvik",
    "Åndalsnes", "Fosnavåg", "Kopervik", "Åkrehamn", "Odda", "Voss",
    "Sogndal", "Otta", "Fagernes", "Geilo", "Drøbak", "Kolvereid",
    "Mysen", "Rjukan",
];

/// Folds the Norwegian letters explicitly and the common Latin accents to
/// their ASCII base letters. Anything else is left for `slugify` to drop.
pub fn ascii_fold(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            'æ' => out.push_str("ae"),
            'Æ' => out.push_str("AE"),
            'ø' => out.push('o'),
            'Ø' => out.push('O'),
            'å' => out.push('a'),
            'Å' => out.push('A'),
            'à' | 'á' | 'â' | 'ã' | 'ä' => out.push('a'),
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' => out.push('A'),
            'è' | 'é' | 'ê' | 'ë' => out.push('e'),
            'È' | 'É' | 'Ê' | 'Ë' => out.push('E'),
            'ì' | 'í' | 'î' | 'ï' => out.push('i'),
            'Ì' | 'Í' | 'Î' | 'Ï' => out.push('I'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' => out.push('o'),
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => out.push('O'),
            'ù' | 'ú' | 'û' | 'ü' => out.push('u'),
            'Ù' | 'Ú' | 'Û' | 'Ü' => out.push('U'),
            'ç' => out.push('c'),
            'Ç' => out.push('C'),
            'ñ' => out.push('n'),
            'Ñ' => out.push('N'),
            'ß' => out.push_str("ss"),
            _ => out.push(c),
        }
    }
    out
}

/// Lowercase, ASCII-only, hyphen-separated. Never yields leading, trailing
/// or doubled hyphens, and `slugify(slugify(x)) == slugify(x)`.
pub fn slugify(input: &str) -> String {
    let folded = ascii_fold(input).to_lowercase();
    let mut slug = String::with_capacity(folded.len());
    let mut pending_hyphen = false;

    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Replaces path separators so a branch name fits in one directory segment.
pub fn branch_dir_name(branch: &str) -> String {
    branch.replace(['/', '\\'], "-")
}

fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone)]
pub struct BranchNamer {
    names: Vec<String>,
}

impl Default for BranchNamer {
    fn default() -> Self {
        Self::new(PLACE_NAMES.iter().map(|s| s.to_string()).collect())
    }
}

impl BranchNamer {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// First free `<namespace>/<place>` name; falls back to numbered
    /// variants, then to a timestamp once every combination is taken.
    pub fn generate(&self, namespace: &str, existing: &HashSet<String>) -> String {
        let slugs: Vec<String> = self
            .names
            .iter()
            .map(|name| slugify(name))
            .filter(|slug| !slug.is_empty())
            .collect();

        if let Some(name) = first_free(namespace, &slugs, existing) {
            return name;
        }

        format!("{namespace}/session-{}", timestamp_millis())
    }

    /// Branch name derived from a free-text task description.
    pub fn generate_for_task(
        &self,
        namespace: &str,
        task_description: &str,
        existing: &HashSet<String>,
    ) -> String {
        let slug = task_slug(task_description);
        if slug.is_empty() {
            return format!("{namespace}/task-{}", timestamp_millis());
        }

        if let Some(name) = first_free(namespace, std::slice::from_ref(&slug), existing) {
            return name;
        }

        format!("{namespace}/{slug}-{}", timestamp_millis())
    }
}

fn task_slug(task_description: &str) -> String {
    let slug = slugify(task_description);
    let truncated = if slug.len() > TASK_SLUG_MAX_LEN {
        &slug[..TASK_SLUG_MAX_LEN]
    } else {
        &slug
    };
    truncated.trim_end_matches('-').to_string()
}

fn first_free(namespace: &str, slugs: &[String], existing: &HashSet<String>) -> Option<String> {
    for slug in slugs {
        let candidate = format!("{namespace}/{slug}");
        if !existing.contains(&candidate) {
            return Some(candidate);
        }
    }

    for slug in slugs {
        for n in 2..=MAX_SUFFIX {
            let candidate = format!("{namespace}/{slug}-{n}");
            if !existing.contains(&candidate) {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taken(names: &[String]) -> HashSet<String> {
        names.iter().cloned().collect()
    }

    fn all_base(namespace: &str) -> Vec<String> {
        PLACE_NAMES
            .iter()
            .map(|n| format!("{namespace}/{}", slugify(n)))
            .collect()
    }

    #[test]
    fn ascii_fold_handles_norwegian_letters() {
        assert_eq!(ascii_fold("Tromsø"), "Tromso");
        assert_eq!(ascii_fold("Ålesund"), "Alesund");
        assert_eq!(ascii_fold("Værøy"), "Vaeroy");
    }

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("Mo i Rana"), "mo-i-rana");
        assert_eq!(slugify("  Fix: login -- bug!! "), "fix-login-bug");
        assert_eq!(slugify("Sandnessjøen"), "sandnessjoen");
        assert_eq!(slugify("!!!"), "", "slugify: only punctuation yields empty");
    }

    #[test]
    fn place_names_are_unique_after_slugify() {
        let slugs: HashSet<String> = PLACE_NAMES.iter().map(|n| slugify(n)).collect();
        assert_eq!(
            slugs.len(),
            PLACE_NAMES.len(),
            "PLACE_NAMES: every place must produce a distinct slug"
        );
    }

    #[test]
    fn branch_dir_name_replaces_separators() {
        assert_eq!(branch_dir_name("proj/oslo"), "proj-oslo");
        assert_eq!(branch_dir_name("a\\b/c"), "a-b-c");
    }

    #[test]
    fn generate_returns_first_place_when_free() {
        let namer = BranchNamer::default();
        assert_eq!(namer.generate("proj", &HashSet::new()), "proj/oslo");
    }

    #[test]
    fn generate_skips_taken_candidates() {
        let namer = BranchNamer::default();
        let existing = taken(&["proj/oslo".to_string(), "proj/bergen".to_string()]);
        assert_eq!(namer.generate("proj", &existing), "proj/trondheim");
    }

    #[test]
    fn generate_appends_suffix_when_base_set_exhausted() {
        let namer = BranchNamer::default();
        let mut existing = taken(&all_base("proj"));

        let first = namer.generate("proj", &existing);
        assert_eq!(first, "proj/oslo-2");

        existing.insert(first);
        let second = namer.generate("proj", &existing);
        assert_eq!(
            second, "proj/oslo-3",
            "generate: a taken suffixed name should advance to the next integer"
        );
    }

    #[test]
    fn generate_falls_back_to_timestamp_when_exhausted() {
        let namer = BranchNamer::new(vec!["Oslo".to_string()]);
        let mut existing = HashSet::from(["proj/oslo".to_string()]);
        for n in 2..=MAX_SUFFIX {
            existing.insert(format!("proj/oslo-{n}"));
        }
        let name = namer.generate("proj", &existing);
        assert!(name.starts_with("proj/session-"), "got {name}");
    }

    #[test]
    fn generate_for_task_uses_description_slug() {
        let namer = BranchNamer::default();
        assert_eq!(
            namer.generate_for_task("proj", "Add dark mode toggle", &HashSet::new()),
            "proj/add-dark-mode-toggle"
        );
    }

    #[test]
    fn generate_for_task_truncates_and_strips_trailing_hyphen() {
        let namer = BranchNamer::default();
        // The 50th character lands on a hyphen.
        let description = format!("{} tail words here", "a".repeat(49));
        let name = namer.generate_for_task("p", &description, &HashSet::new());
        assert_eq!(name, format!("p/{}", "a".repeat(49)));
    }

    #[test]
    fn generate_for_task_handles_collisions() {
        let namer = BranchNamer::default();
        let existing = taken(&["p/fix-bug".to_string(), "p/fix-bug-2".to_string()]);
        assert_eq!(
            namer.generate_for_task("p", "fix bug", &existing),
            "p/fix-bug-3"
        );
    }

    #[test]
    fn generate_for_task_empty_description_uses_timestamp() {
        let namer = BranchNamer::default();
        let name = namer.generate_for_task("p", "???", &HashSet::new());
        assert!(name.starts_with("p/task-"), "got {name}");
    }
}
