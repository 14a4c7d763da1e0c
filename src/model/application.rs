use crate::jvm::BinaryName;
use crate::model::ProgramClass;

/// Ordered collection of program classes
///
/// Class order is preserved (it is the order in which classes get written out).
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Application {
    classes: Vec<ProgramClass>,
}

impl Application {
    pub fn new() -> Application {
        Application::default()
    }

    /// Look up a class by name
    pub fn class(&self, name: &BinaryName) -> Option<&ProgramClass> {
        self.classes.iter().find(|class| &class.name == name)
    }

    pub fn class_mut(&mut self, name: &BinaryName) -> Option<&mut ProgramClass> {
        self.classes.iter_mut().find(|class| &class.name == name)
    }

    /// Add a class, or replace the class with the same name (returning the class replaced)
    pub fn update_class(&mut self, class: ProgramClass) -> Option<ProgramClass> {
        match self.class_mut(&class.name) {
            Some(existing) => Some(std::mem::replace(existing, class)),
            None => {
                self.classes.push(class);
                None
            }
        }
    }

    /// Remove a class by name
    pub fn remove_class(&mut self, name: &BinaryName) -> Option<ProgramClass> {
        let position = self.classes.iter().position(|class| &class.name == name)?;
        Some(self.classes.remove(position))
    }

    pub fn classes(&self) -> impl Iterator<Item = &ProgramClass> {
        self.classes.iter()
    }

    pub fn classes_mut(&mut self) -> impl Iterator<Item = &mut ProgramClass> {
        self.classes.iter_mut()
    }

    /// Take all of the classes out (eg. to process them on other threads)
    pub fn take_classes(&mut self) -> Vec<ProgramClass> {
        std::mem::take(&mut self.classes)
    }

    /// Put back classes previously taken out with [`Application::take_classes`]
    pub fn restore_classes(&mut self, classes: Vec<ProgramClass>) {
        let added = std::mem::replace(&mut self.classes, classes);
        self.classes.extend(added);
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Total number of methods across all classes
    pub fn method_count(&self) -> usize {
        self.classes.iter().map(|class| class.methods.len()).sum()
    }
}

impl FromIterator<ProgramClass> for Application {
    fn from_iter<I: IntoIterator<Item = ProgramClass>>(iter: I) -> Self {
        let mut application = Application::new();
        for class in iter {
            application.update_class(class);
        }
        application
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{ClassAccessFlags, Name};

    fn class(name: &str) -> ProgramClass {
        ProgramClass::new(
            BinaryName::from_str(name).unwrap(),
            ClassAccessFlags::PUBLIC,
        )
    }

    #[test]
    fn update_lookup_remove() {
        let mut app: Application = vec![class("a/A"), class("b/B")].into_iter().collect();
        assert_eq!(app.len(), 2);

        let mut replacement = class("a/A");
        replacement.source_file = Some(String::from("A.java"));
        let previous = app.update_class(replacement).unwrap();
        assert_eq!(previous.source_file, None);
        assert_eq!(app.len(), 2);
        assert_eq!(
            app.classes().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["a/A", "b/B"]
        );

        let name = BinaryName::from_str("b/B").unwrap();
        assert!(app.remove_class(&name).is_some());
        assert!(app.class(&name).is_none());
        assert!(app.remove_class(&name).is_none());
        assert_eq!(app.method_count(), 0);
    }

    #[test]
    fn take_and_restore() {
        let mut app: Application = vec![class("a/A"), class("b/B")].into_iter().collect();
        let taken = app.take_classes();
        assert!(app.is_empty());
        app.update_class(class("c/C"));
        app.restore_classes(taken);
        assert_eq!(
            app.classes().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["a/A", "b/B", "c/C"]
        );
    }
}
