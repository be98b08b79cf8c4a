//! Packages required by the rendered body, collected during one render pass
//! and emitted once in the preamble.

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub options: Vec<String>,
}

impl Package {
    /// The `\usepackage` line loading this package.
    pub fn directive(&self) -> String {
        if self.options.is_empty() {
            format!("\\usepackage{{{}}}", self.name)
        } else {
            format!("\\usepackage[{}]{{{}}}", self.options.join(","), self.name)
        }
    }
}

/// Package name to options, in first-declaration order.
#[derive(Debug, Clone, Default)]
pub struct PackageSet {
    packages: Vec<Package>,
}

impl PackageSet {
    pub fn new() -> Self {
        PackageSet::default()
    }

    pub fn require(&mut self, name: &str) {
        self.require_with(name, &[]);
    }

    /// Declare a package with options. Declaring it again merges the
    /// options; an option is only recorded once.
    pub fn require_with(&mut self, name: &str, options: &[&str]) {
        let package = match self.packages.iter_mut().position(|p| p.name == name) {
            Some(index) => &mut self.packages[index],
            None => {
                debug!(package = name, "package required");
                self.packages.push(Package {
                    name: name.to_string(),
                    options: Vec::new(),
                });
                let last = self.packages.len() - 1;
                &mut self.packages[last]
            }
        };
        for option in options {
            if !package.options.iter().any(|o| o == option) {
                package.options.push(option.to_string());
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.iter().any(|p| p.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// One `\usepackage` line per package.
    pub fn directives(&self) -> String {
        self.packages
            .iter()
            .map(Package::directive)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
