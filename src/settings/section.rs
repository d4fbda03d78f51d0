//! Section resolution for file paths
//!
//! A file path selects its section by its first segment, either the section
//! name (`COMMON/`, `USERS/`, `HOST/`, any case) or the ClickHouse directory
//! it lands in (`config.d/`, `users.d/`, `conf.d/`). The segment is compared
//! whole, so `hosts/x.xml` is not in the host section.

use crate::Error;

/// Target section of a configuration file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SettingsSection {
    /// Shared by every host (`config.d`)
    Common,
    /// Shared users/profiles/quotas (`users.d`)
    Users,
    /// Per-host (`conf.d`)
    Host,
}

impl SettingsSection {
    /// Resolve the section named by the first segment of `path`
    pub fn from_path(path: &str) -> Result<Self, Error> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let (Some(first), Some(_)) = (segments.next(), segments.next()) else {
            return Err(Error::validation(path, "file path has no section"));
        };

        match first.to_ascii_lowercase().as_str() {
            "common" | "config.d" => Ok(Self::Common),
            "users" | "users.d" => Ok(Self::Users),
            "host" | "conf.d" => Ok(Self::Host),
            other => Err(Error::validation(
                path,
                format!("unknown file section '{other}'"),
            )),
        }
    }
}

/// File name part of a settings path (everything after the last `/`)
pub fn filename_from_path(path: &str) -> Option<&str> {
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::common_name("COMMON/a.xml", SettingsSection::Common)]
    #[case::common_dir("config.d/a.xml", SettingsSection::Common)]
    #[case::users_name("users/a.xml", SettingsSection::Users)]
    #[case::users_dir("users.d/a.xml", SettingsSection::Users)]
    #[case::host_name("Host/a.xml", SettingsSection::Host)]
    #[case::host_dir("conf.d/a.xml", SettingsSection::Host)]
    fn resolves_section_names_and_directories(
        #[case] path: &str,
        #[case] expected: SettingsSection,
    ) {
        assert_eq!(SettingsSection::from_path(path).unwrap(), expected);
    }

    #[rstest]
    #[case::plural("hosts/a.xml")]
    #[case::prefix("hostname.xml")]
    #[case::suffix("commons/a.xml")]
    #[case::bare_file("a.xml")]
    #[case::bare_section("host")]
    fn path_without_a_known_section_is_rejected(#[case] path: &str) {
        assert!(SettingsSection::from_path(path).is_err());
    }

    #[test]
    fn filename_is_last_segment() {
        assert_eq!(filename_from_path("host/dir/a.xml"), Some("a.xml"));
        assert_eq!(filename_from_path("a.xml"), Some("a.xml"));
        assert_eq!(filename_from_path("host/"), None);
    }
}
