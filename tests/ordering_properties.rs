//! Property-based checks for source precedence and converter ordering.

use proptest::prelude::*;
use tamaya::conversion::{ConversionContext, ConverterRegistry};
use tamaya::{Configuration, MapPropertySource, PropertySource};

#[derive(Debug, Clone, PartialEq)]
struct Tagged(i32);

proptest! {
    #[test]
    fn highest_ordinal_wins(ordinals in prop::collection::hash_set(-1000i32..1000, 1..8), reverse in any::<bool>()) {
        let mut ordinals: Vec<i32> = ordinals.into_iter().collect();
        if reverse {
            ordinals.reverse();
        }

        let mut builder = Configuration::builder();
        for ordinal in &ordinals {
            builder = builder.add_source(
                MapPropertySource::new(format!("source-{ordinal}"))
                    .with_value("key", format!("value-{ordinal}"))
                    .with_ordinal(*ordinal),
            );
        }
        let config = builder.build().unwrap();

        let top = ordinals.iter().max().unwrap();
        let expected = format!("value-{top}");
        prop_assert_eq!(config.get("key"), Some(expected));

        let sources = config.context().property_sources();
        let listed: Vec<i32> = sources.iter().map(|s| s.ordinal()).collect();
        prop_assert!(listed.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn highest_priority_converter_answers(priorities in prop::collection::hash_set(-100i32..100, 1..6)) {
        let registry = ConverterRegistry::new();
        for priority in &priorities {
            let priority = *priority;
            registry.register_fn::<Tagged, _>(
                format!("Tagged{priority}"),
                priority,
                move |_: &str, _: &ConversionContext| Ok(Some(Tagged(priority))),
            );
        }

        let ordered: Vec<i32> = registry
            .get_converters::<Tagged>()
            .iter()
            .map(|c| c.priority())
            .collect();
        prop_assert!(ordered.windows(2).all(|pair| pair[0] > pair[1]));

        let top = *priorities.iter().max().unwrap();
        let ctx = ConversionContext::of_type::<Tagged>();
        prop_assert_eq!(registry.convert_value::<Tagged>("anything", &ctx).unwrap(), Tagged(top));
    }

    #[test]
    fn declined_values_fall_through_to_lower_priorities(threshold in 0i32..50, input in 0i32..100) {
        let registry = ConverterRegistry::new();
        registry.register_fn::<Tagged, _>("Picky", 10, move |value: &str, _: &ConversionContext| {
            let n: i32 = value.parse().unwrap_or(-1);
            Ok((n >= threshold).then_some(Tagged(n)))
        });
        registry.register_fn::<Tagged, _>("Fallback", 1, |_: &str, _: &ConversionContext| Ok(Some(Tagged(-1))));

        let ctx = ConversionContext::of_type::<Tagged>();
        let converted = registry.convert_value::<Tagged>(&input.to_string(), &ctx).unwrap();
        let expected = if input >= threshold { Tagged(input) } else { Tagged(-1) };
        prop_assert_eq!(converted, expected);
    }
}
