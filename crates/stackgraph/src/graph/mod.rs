//! Dependency graph of steps
//!
//! Edges are stored as `step -> set of steps it requires`; the transpose
//! (`required_by`) is derived on demand. Maps are ordered so every walk
//! over the graph is deterministic.

mod cycle;

#[cfg(test)]
mod tests;

use crate::error::{GraphError, Result};
use crate::step::Step;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Wire format of a persisted graph: step name -> names it requires
pub type GraphDict = BTreeMap<String, Vec<String>>;

/// A step together with its declared relationships.
///
/// `required_by` is sugar for adding the reverse edge from each listed
/// step to this one.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub step: Step,
    pub requires: BTreeSet<String>,
    pub required_by: BTreeSet<String>,
}

impl StepDefinition {
    pub fn new(step: Step) -> Self {
        Self {
            step,
            requires: BTreeSet::new(),
            required_by: BTreeSet::new(),
        }
    }

    pub fn requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn required_by<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_by.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Directed acyclic graph of named steps
#[derive(Debug, Clone, Default)]
pub struct Graph {
    steps: BTreeMap<String, Step>,
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from step definitions and validate it.
    ///
    /// Self references in either `requires` or `required_by` are rejected
    /// before the general cycle check runs.
    pub fn from_definitions<I>(definitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = StepDefinition>,
    {
        let mut graph = Self::new();
        let mut relations = Vec::new();

        for def in definitions {
            let name = def.step.name().to_string();
            if def.requires.contains(&name) || def.required_by.contains(&name) {
                return Err(GraphError::SelfDependency(name));
            }
            graph.add_step(def.step)?;
            relations.push((name, def.requires, def.required_by));
        }

        for (name, requires, required_by) in relations {
            for dep in requires {
                graph.add_dependency(&name, &dep)?;
            }
            for dependent in required_by {
                if !graph.contains(&dependent) {
                    return Err(GraphError::DanglingDependency {
                        step: name,
                        dependency: dependent,
                    });
                }
                graph.add_dependency(&dependent, &name)?;
            }
        }

        graph.validate()?;
        Ok(graph)
    }

    /// Register a step. Fails if the name is already taken.
    pub fn add_step(&mut self, step: Step) -> Result<()> {
        let name = step.name().to_string();
        if self.steps.contains_key(&name) {
            return Err(GraphError::DuplicateStep(name));
        }
        self.edges.entry(name.clone()).or_default();
        self.steps.insert(name, step);
        Ok(())
    }

    /// Register a step unless one with the same name exists.
    ///
    /// Returns whether the step was added.
    pub fn add_step_if_not_exists(&mut self, step: Step) -> bool {
        if self.steps.contains_key(step.name()) {
            return false;
        }
        self.edges.entry(step.name().to_string()).or_default();
        self.steps.insert(step.name().to_string(), step);
        true
    }

    /// Record that `step` requires `dependency`. Both must exist.
    pub fn add_dependency(&mut self, step: &str, dependency: &str) -> Result<()> {
        if step == dependency {
            return Err(GraphError::SelfDependency(step.to_string()));
        }
        if !self.steps.contains_key(step) {
            return Err(GraphError::StepNotFound(step.to_string()));
        }
        if !self.steps.contains_key(dependency) {
            return Err(GraphError::DanglingDependency {
                step: step.to_string(),
                dependency: dependency.to_string(),
            });
        }
        self.edges
            .entry(step.to_string())
            .or_default()
            .insert(dependency.to_string());
        Ok(())
    }

    /// Add several dependencies for one step
    pub fn add_dependencies<I, S>(&mut self, step: &str, dependencies: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for dep in dependencies {
            self.add_dependency(step, dep.as_ref())?;
        }
        Ok(())
    }

    /// Drop the existing dependencies of `step` and record `dependencies`
    /// instead. Nothing changes if one of them is invalid.
    pub fn replace_dependencies<I, S>(&mut self, step: &str, dependencies: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.steps.contains_key(step) {
            return Err(GraphError::StepNotFound(step.to_string()));
        }
        let previous = self.edges.insert(step.to_string(), BTreeSet::new());
        for dep in dependencies {
            if let Err(err) = self.add_dependency(step, dep.as_ref()) {
                match previous {
                    Some(previous) => self.edges.insert(step.to_string(), previous),
                    None => self.edges.remove(step),
                };
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Step> {
        self.steps.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// Step names in sorted order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.keys().map(String::as_str).collect()
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.values()
    }

    pub fn steps_mut(&mut self) -> impl Iterator<Item = &mut Step> {
        self.steps.values_mut()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Direct dependencies of a step
    pub fn requires(&self, name: &str) -> BTreeSet<String> {
        self.edges.get(name).cloned().unwrap_or_default()
    }

    /// Steps that directly depend on `name`
    pub fn required_by(&self, name: &str) -> BTreeSet<String> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(name))
            .map(|(step, _)| step.clone())
            .collect()
    }

    /// Number of steps the most depended-upon step has depending on it
    pub fn max_in_degree(&self) -> usize {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for deps in self.edges.values() {
            for dep in deps {
                *counts.entry(dep.as_str()).or_default() += 1;
            }
        }
        counts.into_values().max().unwrap_or(0)
    }

    /// Everything reachable from `name` by following `requires` edges
    pub fn transitive_dependencies(&self, name: &str) -> BTreeSet<String> {
        self.reachable(name, |n| self.requires(n))
    }

    /// Everything reachable from `name` by following `required_by` edges
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        let transposed = self.transposed_edges();
        self.reachable(name, |n| transposed.get(n).cloned().unwrap_or_default())
    }

    fn reachable<F>(&self, name: &str, next: F) -> BTreeSet<String>
    where
        F: Fn(&str) -> BTreeSet<String>,
    {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<String> = next(name).into_iter().collect();
        while let Some(current) = queue.pop_front() {
            if seen.insert(current.clone()) {
                queue.extend(next(&current));
            }
        }
        seen.remove(name);
        seen
    }

    fn transposed_edges(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut transposed: BTreeMap<String, BTreeSet<String>> =
            self.edges.keys().map(|k| (k.clone(), BTreeSet::new())).collect();
        for (step, deps) in &self.edges {
            for dep in deps {
                transposed.entry(dep.clone()).or_default().insert(step.clone());
            }
        }
        transposed
    }

    /// Check edge endpoints, then acyclicity.
    pub fn validate(&self) -> Result<()> {
        for (step, deps) in &self.edges {
            if !self.steps.contains_key(step) {
                return Err(GraphError::StepNotFound(step.clone()));
            }
            for dep in deps {
                if dep == step {
                    return Err(GraphError::SelfDependency(step.clone()));
                }
                if !self.steps.contains_key(dep) {
                    return Err(GraphError::DanglingDependency {
                        step: step.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        if let Some(path) = cycle::find_cycle(&self.edges) {
            return Err(GraphError::Cycle { path });
        }
        Ok(())
    }

    /// Order steps so each appears after its dependencies.
    ///
    /// With `reverse`, each step appears before its dependencies instead
    /// (destroy order). Ties are broken by name.
    pub fn topological_order(&self, reverse: bool) -> Result<Vec<String>> {
        self.validate()?;

        let transposed = self.transposed_edges();
        let mut remaining: BTreeMap<&str, usize> = self
            .edges
            .iter()
            .map(|(step, deps)| (step.as_str(), deps.len()))
            .collect();
        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(step, _)| *step)
            .collect();

        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(step) = ready.pop_first() {
            order.push(step.to_string());
            for dependent in transposed.get(step).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(dependent.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent.as_str());
                    }
                }
            }
        }

        if reverse {
            order.reverse();
        }
        Ok(order)
    }

    /// Remove a step and every edge that references it
    pub fn prune(&mut self, name: &str) -> Option<Step> {
        let step = self.steps.remove(name)?;
        self.edges.remove(name);
        for deps in self.edges.values_mut() {
            deps.remove(name);
        }
        Some(step)
    }

    /// Subgraph containing `targets` and all of their transitive dependencies
    pub fn filtered<I, S>(&self, targets: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keep = BTreeSet::new();
        for target in targets {
            let target = target.as_ref();
            if !self.contains(target) {
                return Err(GraphError::StepNotFound(target.to_string()));
            }
            keep.insert(target.to_string());
            keep.extend(self.transitive_dependencies(target));
        }

        let mut graph = Self::new();
        for name in &keep {
            if let Some(step) = self.steps.get(name) {
                graph.add_step(step.clone())?;
            }
        }
        for name in &keep {
            graph.add_dependencies(name, self.requires(name))?;
        }
        Ok(graph)
    }

    /// Subgraph containing `targets` and all of their transitive dependents.
    ///
    /// This is what a destroy of `targets` must cover: nothing may still
    /// require a stack once it is gone.
    pub fn filtered_dependents<I, S>(&self, targets: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(self.transposed().filtered(targets)?.transposed())
    }

    /// Same steps with every edge reversed
    pub fn transposed(&self) -> Self {
        Self {
            steps: self.steps.clone(),
            edges: self.transposed_edges(),
        }
    }

    /// Serialize the dependency relation. Statuses are not included.
    pub fn to_dict(&self) -> GraphDict {
        self.edges
            .iter()
            .map(|(step, deps)| (step.clone(), deps.iter().cloned().collect()))
            .collect()
    }

    /// Rebuild a graph from its wire format; every step starts pending.
    pub fn from_dict(data: &GraphDict) -> Result<Self> {
        let mut graph = Self::new();
        for name in data.keys() {
            graph.add_step(Step::new(name.clone()))?;
        }
        for (name, deps) in data {
            for dep in deps {
                if dep == name {
                    return Err(GraphError::SelfDependency(name.clone()));
                }
                if !graph.contains(dep) {
                    return Err(GraphError::DanglingDependency {
                        step: name.clone(),
                        dependency: dep.clone(),
                    });
                }
                graph.add_dependency(name, dep)?;
            }
        }
        graph.validate()?;
        Ok(graph)
    }

    /// JSON form of [`Graph::to_dict`]
    pub fn dumps(&self, pretty: bool) -> Result<String> {
        let dict = self.to_dict();
        let json = if pretty {
            serde_json::to_string_pretty(&dict)?
        } else {
            serde_json::to_string(&dict)?
        };
        Ok(json)
    }

    /// Parse the JSON form produced by [`Graph::dumps`]
    pub fn loads(json: &str) -> Result<Self> {
        let dict: GraphDict = serde_json::from_str(json)?;
        Self::from_dict(&dict)
    }
}
