use super::{Arena, ObjectId};

/// C3 linearization of a class with the given direct bases.
///
/// Returns the full method resolution order starting with `class` itself.
pub(crate) fn linearize(arena: &Arena, class: ObjectId, bases: &[ObjectId]) -> Result<Vec<ObjectId>, String> {
    let mut sequences: Vec<Vec<ObjectId>> = bases.iter().map(|base| arena.mro_of(*base)).collect();
    sequences.push(bases.to_vec());

    let mut result = vec![class];
    loop {
        sequences.retain(|seq| !seq.is_empty());
        if sequences.is_empty() {
            return Ok(result);
        }

        let candidate = sequences
            .iter()
            .map(|seq| seq[0])
            .find(|head| !sequences.iter().any(|seq| seq[1..].contains(head)));

        let Some(next) = candidate else {
            return Err("Cannot create a consistent method resolution order (MRO)".to_string());
        };

        result.push(next);
        for seq in sequences.iter_mut() {
            if seq[0] == next {
                seq.remove(0);
            }
        }
    }
}

/// Depth-first, left-to-right order with duplicates removed; used when C3 fails
pub(crate) fn fallback(arena: &Arena, class: ObjectId, bases: &[ObjectId]) -> Vec<ObjectId> {
    let mut result = vec![class];
    for base in bases {
        for id in arena.mro_of(*base) {
            if !result.contains(&id) {
                result.push(id);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::program::{ClassObject, Origin, PyObject};
    use indexmap::IndexMap;

    fn class(arena: &mut Arena, name: &str, bases: &[ObjectId]) -> ObjectId {
        let id = arena.alloc(PyObject::Class(ClassObject {
            name: name.to_string(),
            qualname: name.to_string(),
            module: "m".to_string(),
            doc: None,
            bases: bases.to_vec(),
            orig_bases: None,
            metaclass: None,
            mro: Vec::new(),
            dict: IndexMap::new(),
            annotations: IndexMap::new(),
            decorators: Vec::new(),
            namespace: None,
            origin: Origin::Source,
        }));
        let mro = linearize(arena, id, bases).unwrap();
        arena.class_mut(id).unwrap().mro = mro;
        id
    }

    #[test]
    fn test_diamond() {
        let mut arena = Arena::default();
        let object = class(&mut arena, "object", &[]);
        let a = class(&mut arena, "A", &[object]);
        let b = class(&mut arena, "B", &[a]);
        let c = class(&mut arena, "C", &[a]);
        let d = class(&mut arena, "D", &[b, c]);

        assert_eq!(arena.mro_of(d), vec![d, b, c, a, object]);
    }

    #[test]
    fn test_inconsistent_order_is_rejected() {
        let mut arena = Arena::default();
        let object = class(&mut arena, "object", &[]);
        let a = class(&mut arena, "A", &[object]);
        let b = class(&mut arena, "B", &[a]);
        let x = class(&mut arena, "X", &[]);

        assert!(linearize(&arena, x, &[a, b]).is_err());
        assert_eq!(fallback(&arena, x, &[a, b]), vec![x, a, object, b]);
    }
}
